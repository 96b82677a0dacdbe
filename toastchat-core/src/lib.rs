use std::{fmt, io, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod cache;
pub mod clipboard;
pub mod files;
pub mod prompt;
pub mod render;
pub mod router;

pub use cache::{RECENT_CHAT_CAPACITY, RecentChatCache, Session};
pub use clipboard::{ClipboardError, ClipboardSource, resolve_clipboard_path};
pub use files::{DEFAULT_FILES_DIR, FilesDir, sanitize_file_name};
pub use prompt::{ActionId, InputId, Notifier, NotifyError, Prompt, PromptAction, PromptResponse};
pub use router::{Decision, ErrorKind, Outcome, Router, RouterError, Step, Target, decide};

pub const MAX_ATTACHMENT_BYTES: usize = 25 * 1024 * 1024;
pub const MAX_BRIDGE_FRAME_BYTES: usize = 48 * 1024 * 1024;

pub type ConversationId = String;
pub type MessageId = String;
pub type RequestId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    File,
    Video,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [MediaKind::Image, MediaKind::File, MediaKind::Video];

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::File => "file",
            MediaKind::Video => "video",
        }
    }

    /// Noun with its indefinite article, e.g. "an image".
    pub fn with_article(self) -> &'static str {
        match self {
            MediaKind::Image => "an image",
            MediaKind::File => "a file",
            MediaKind::Video => "a video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "file" => Ok(MediaKind::File),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("unknown media kind {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Attachment,
    Recording,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    Picture { file_name: String },
    Attachment { kind: AttachmentKind, file_name: String },
    Unsupported { type_name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: MessageId,
    pub conversation: Conversation,
    /// Group member name for group chats, otherwise the sender's display name.
    pub sender_name: String,
    pub content: MessageContent,
}

impl InboundMessage {
    /// Name of the payload that has to be fetched before the message can be shown.
    pub fn attachment_file_name(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Picture { file_name }
            | MessageContent::Attachment { file_name, .. } => Some(file_name.as_str()),
            MessageContent::Text { .. } | MessageContent::Unsupported { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundPayload {
    Text { text: String },
    Media { kind: MediaKind, path: PathBuf },
}

impl OutboundPayload {
    pub fn kind_label(&self) -> &'static str {
        match self {
            OutboundPayload::Text { .. } => "text",
            OutboundPayload::Media { kind, .. } => kind.as_str(),
        }
    }
}

/// Policy applied when an outbound keyword does not resolve to exactly one chat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundPolicy {
    #[default]
    Notify,
    Silent,
}

impl FromStr for NotFoundPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notify" => Ok(NotFoundPolicy::Notify),
            "silent" => Ok(NotFoundPolicy::Silent),
            other => Err(format!("expected `notify` or `silent`, got {other:?}")),
        }
    }
}

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("bridge request timed out")]
    Timeout,
    #[error("bridge connection closed")]
    Closed,
    #[error("bridge rejected request: {0}")]
    Rejected(String),
    #[error("unexpected bridge reply to {request}")]
    UnexpectedReply { request: &'static str },
    #[error("attachment exceeds {max} bytes")]
    AttachmentTooLarge { max: usize },
    #[error("attachment payload is not valid base64: {0}")]
    InvalidAttachment(String),
    #[error("attachment write failed: {0}")]
    Io(#[from] io::Error),
}

/// The chat client the relay drives. Implementations block until the
/// underlying client answers.
pub trait MessagingClient: Send + Sync {
    fn search(&self, keyword: &str) -> Result<Vec<Conversation>, MessagingError>;

    fn send(
        &self,
        conversation: &Conversation,
        payload: &OutboundPayload,
    ) -> Result<(), MessagingError>;

    /// Writes the attachment of `message` to `dest`.
    fn fetch_attachment(
        &self,
        message: &InboundMessage,
        dest: &std::path::Path,
    ) -> Result<(), MessagingError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeRequest {
    Search {
        id: RequestId,
        keyword: String,
    },
    Send {
        id: RequestId,
        conversation_id: ConversationId,
        payload: OutboundPayload,
    },
    FetchAttachment {
        id: RequestId,
        message_id: MessageId,
    },
}

impl BridgeRequest {
    pub fn id(&self) -> RequestId {
        match self {
            BridgeRequest::Search { id, .. }
            | BridgeRequest::Send { id, .. }
            | BridgeRequest::FetchAttachment { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BridgeRequest::Search { .. } => "search",
            BridgeRequest::Send { .. } => "send",
            BridgeRequest::FetchAttachment { .. } => "fetch_attachment",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    Conversations {
        id: RequestId,
        conversations: Vec<Conversation>,
    },
    Ack {
        id: RequestId,
    },
    Attachment {
        id: RequestId,
        data_b64: String,
    },
    Error {
        #[serde(default)]
        id: Option<RequestId>,
        message: String,
    },
    Message {
        message: InboundMessage,
    },
}

impl BridgeEvent {
    /// Id of the request this event answers; `None` for pushed events.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            BridgeEvent::Conversations { id, .. }
            | BridgeEvent::Ack { id }
            | BridgeEvent::Attachment { id, .. } => Some(*id),
            BridgeEvent::Error { id, .. } => *id,
            BridgeEvent::Message { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("bridge frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub fn encode_request(request: &BridgeRequest) -> Result<String, CoreError> {
    serde_json::to_string(request).map_err(|err| CoreError::Serialization(err.to_string()))
}

pub fn decode_event(frame: &str) -> Result<BridgeEvent, CoreError> {
    if frame.len() > MAX_BRIDGE_FRAME_BYTES {
        return Err(CoreError::FrameTooLarge {
            max: MAX_BRIDGE_FRAME_BYTES,
        });
    }
    serde_json::from_str(frame).map_err(|err| CoreError::Serialization(err.to_string()))
}

/// Upper bound of the decoded size of a base64 payload.
pub fn decoded_len_estimate(data_b64: &str) -> usize {
    data_b64.len().div_ceil(4) * 3
}
