use std::{collections::HashMap, fmt, path::PathBuf};

use thiserror::Error;

use crate::MediaKind;

/// Buttons the relay puts on a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionId {
    Reply,
    Send,
    SendMedia(MediaKind),
    FromClipboard,
    OpenFile,
    Back,
    Yes,
    No,
}

impl ActionId {
    /// Stable token carried in the toast activation arguments.
    pub fn as_argument(self) -> String {
        match self {
            ActionId::Reply => "reply".to_owned(),
            ActionId::Send => "send".to_owned(),
            ActionId::SendMedia(kind) => format!("media:{kind}"),
            ActionId::FromClipboard => "clipboard".to_owned(),
            ActionId::OpenFile => "open".to_owned(),
            ActionId::Back => "back".to_owned(),
            ActionId::Yes => "yes".to_owned(),
            ActionId::No => "no".to_owned(),
        }
    }

    pub fn parse_argument(argument: &str) -> Option<Self> {
        let action = match argument {
            "reply" => ActionId::Reply,
            "send" => ActionId::Send,
            "clipboard" => ActionId::FromClipboard,
            "open" => ActionId::OpenFile,
            "back" => ActionId::Back,
            "yes" => ActionId::Yes,
            "no" => ActionId::No,
            other => ActionId::SendMedia(other.strip_prefix("media:")?.parse().ok()?),
        };
        Some(action)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_argument())
    }
}

/// Free-text fields a toast can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputId {
    Keyword,
    Message,
    MediaPath(MediaKind),
}

impl InputId {
    pub fn as_str(self) -> &'static str {
        match self {
            InputId::Keyword => "keyword",
            InputId::Message => "message",
            InputId::MediaPath(MediaKind::Image) => "path-image",
            InputId::MediaPath(MediaKind::File) => "path-file",
            InputId::MediaPath(MediaKind::Video) => "path-video",
        }
    }

    pub fn placeholder(self) -> &'static str {
        match self {
            InputId::Keyword => "Nickname, remark, etc.",
            InputId::Message => "Enter the message here...",
            InputId::MediaPath(MediaKind::Image) => "Enter the path of the image...",
            InputId::MediaPath(MediaKind::File) => "Enter the path of the file...",
            InputId::MediaPath(MediaKind::Video) => "Enter the path of the video...",
        }
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptAction {
    pub id: ActionId,
    pub label: String,
    /// Input the button is drawn next to.
    pub input_hint: Option<InputId>,
    /// File handed to the OS instead of reporting back to the relay.
    pub open: Option<PathBuf>,
}

impl PromptAction {
    pub fn new(id: ActionId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            input_hint: None,
            open: None,
        }
    }

    pub fn beside(mut self, input: InputId) -> Self {
        self.input_hint = Some(input);
        self
    }

    pub fn opening(mut self, path: PathBuf) -> Self {
        self.open = Some(path);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub body: String,
    pub image: Option<PathBuf>,
    pub inputs: Vec<InputId>,
    /// Display names offered in a drop-down; empty means no drop-down.
    pub selection: Vec<String>,
    pub actions: Vec<PromptAction>,
}

impl Prompt {
    /// A toast without inputs or buttons.
    pub fn notice(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn action_ids(&self) -> Vec<ActionId> {
        self.actions.iter().map(|action| action.id).collect()
    }

    pub fn has_action(&self, id: ActionId) -> bool {
        self.actions.iter().any(|action| action.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResponse {
    Activated {
        action: ActionId,
        inputs: HashMap<InputId, String>,
        selection: Option<String>,
    },
    /// Closed, timed out, or clicked without choosing a button.
    Dismissed,
}

impl PromptResponse {
    pub fn action(action: ActionId) -> Self {
        PromptResponse::Activated {
            action,
            inputs: HashMap::new(),
            selection: None,
        }
    }

    pub fn with_input(mut self, id: InputId, value: impl Into<String>) -> Self {
        if let PromptResponse::Activated { inputs, .. } = &mut self {
            inputs.insert(id, value.into());
        }
        self
    }

    pub fn with_selection(mut self, value: impl Into<String>) -> Self {
        if let PromptResponse::Activated { selection, .. } = &mut self {
            *selection = Some(value.into());
        }
        self
    }
}

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Shows a prompt and blocks until the user answers or it goes away.
pub trait Notifier: Send + Sync {
    fn prompt(&self, prompt: &Prompt) -> Result<PromptResponse, NotifyError>;
}
