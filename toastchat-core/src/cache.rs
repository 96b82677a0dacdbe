use std::{collections::VecDeque, sync::Mutex};

use crate::Conversation;

pub const RECENT_CHAT_CAPACITY: usize = 5;

/// Most-recently-used list of chats, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentChatCache {
    entries: VecDeque<Conversation>,
}

impl RecentChatCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `conversation` as most recently used.
    ///
    /// A known id is moved to the back (and its display name refreshed); a new
    /// id evicts the oldest entry once the cache holds
    /// [`RECENT_CHAT_CAPACITY`] chats.
    pub fn touch(&mut self, conversation: Conversation) {
        if let Some(index) = self
            .entries
            .iter()
            .position(|entry| entry.id == conversation.id)
        {
            self.entries.remove(index);
        } else if self.entries.len() >= RECENT_CHAT_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(conversation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.name.clone()).collect()
    }

    /// Most recently used entry with the given display name.
    pub fn find_by_name(&self, name: &str) -> Option<&Conversation> {
        self.entries.iter().rev().find(|entry| entry.name == name)
    }
}

/// Process-lifetime state shared by the inbound worker and the hotkey thread.
#[derive(Debug, Default)]
pub struct Session {
    recent: Mutex<RecentChatCache>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self, conversation: Conversation) {
        if let Ok(mut recent) = self.recent.lock() {
            recent.touch(conversation);
        }
    }

    pub fn recent_names(&self) -> Vec<String> {
        self.recent
            .lock()
            .map(|recent| recent.names())
            .unwrap_or_default()
    }

    pub fn find_recent(&self, name: &str) -> Option<Conversation> {
        self.recent
            .lock()
            .ok()
            .and_then(|recent| recent.find_by_name(name).cloned())
    }

    pub fn snapshot(&self) -> RecentChatCache {
        self.recent
            .lock()
            .map(|recent| recent.clone())
            .unwrap_or_default()
    }
}
