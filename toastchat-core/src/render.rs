//! Prompt texts and button layouts for every router step.

use std::path::Path;

use crate::{
    Conversation, InboundMessage, MediaKind, MessageContent,
    prompt::{ActionId, InputId, Prompt, PromptAction},
};

const CACHED_CHAT_HINT: &str =
    "You can leave the nickname field blank by selecting a cached chat below.";

/// First line of every toast about `message`.
pub fn message_header(message: &InboundMessage) -> String {
    let who = format!("{}({})", message.conversation.name, message.sender_name);
    match &message.content {
        MessageContent::Text { text } => format!("{who}: {text}"),
        MessageContent::Picture { .. } => format!("{who}:"),
        MessageContent::Attachment { file_name, .. } => {
            format!("{who} sends you a file:\n{file_name}")
        }
        MessageContent::Unsupported { .. } => {
            format!("{who} sends you a message that is currently not supported.")
        }
    }
}

/// Toast for `message` with `inputs` and `actions`; `attachment` is the
/// fetched payload, shown inline for pictures and offered via "Open file"
/// for everything else.
fn message_prompt(
    message: &InboundMessage,
    attachment: Option<&Path>,
    input: InputId,
    leading: PromptAction,
    trailing: Vec<PromptAction>,
) -> Prompt {
    let mut actions = vec![leading];
    let mut image = None;
    match (&message.content, attachment) {
        (MessageContent::Picture { .. }, Some(path)) => image = Some(path.to_path_buf()),
        (MessageContent::Attachment { .. }, Some(path)) => {
            let open = PromptAction::new(ActionId::OpenFile, "Open file");
            actions.push(open.opening(path.to_path_buf()));
        }
        _ => {}
    }
    actions.extend(trailing);

    Prompt {
        body: message_header(message),
        image,
        inputs: vec![input],
        selection: Vec::new(),
        actions,
    }
}

fn media_buttons() -> Vec<PromptAction> {
    MediaKind::ALL
        .into_iter()
        .map(|kind| PromptAction::new(ActionId::SendMedia(kind), format!("Send {kind}")))
        .collect()
}

pub fn reply_menu(message: &InboundMessage, attachment: Option<&Path>) -> Prompt {
    message_prompt(
        message,
        attachment,
        InputId::Message,
        PromptAction::new(ActionId::Reply, "Reply").beside(InputId::Message),
        media_buttons(),
    )
}

pub fn reply_media(message: &InboundMessage, kind: MediaKind, attachment: Option<&Path>) -> Prompt {
    let input = InputId::MediaPath(kind);
    message_prompt(
        message,
        attachment,
        input,
        PromptAction::new(ActionId::Send, "Send").beside(input),
        vec![
            PromptAction::new(ActionId::FromClipboard, "From clipboard"),
            PromptAction::new(ActionId::Back, "Back"),
        ],
    )
}

fn compose_body(what: &str, recent: &[String]) -> String {
    if recent.is_empty() {
        format!("Send {what}:")
    } else {
        format!("Send {what}. {CACHED_CHAT_HINT}")
    }
}

/// Outbound "send a message" prompt; `recent` is listed most recent first.
pub fn send_menu(recent: &[String]) -> Prompt {
    let mut actions =
        vec![PromptAction::new(ActionId::Send, "Send").beside(InputId::Message)];
    actions.extend(media_buttons());
    Prompt {
        body: compose_body("a message", recent),
        image: None,
        inputs: vec![InputId::Keyword, InputId::Message],
        selection: recent.to_vec(),
        actions,
    }
}

pub fn send_media(kind: MediaKind, recent: &[String]) -> Prompt {
    let input = InputId::MediaPath(kind);
    Prompt {
        body: compose_body(kind.with_article(), recent),
        image: None,
        inputs: vec![InputId::Keyword, input],
        selection: recent.to_vec(),
        actions: vec![
            PromptAction::new(ActionId::Send, "Send").beside(input),
            PromptAction::new(ActionId::FromClipboard, "From clipboard"),
            PromptAction::new(ActionId::Back, "Back"),
        ],
    }
}

pub fn confirm(target: &Conversation, kind: MediaKind, path: &Path) -> Prompt {
    let (body, image) = match kind {
        MediaKind::Image => (
            format!("Sending the following image to {}:", target.name),
            Some(path.to_path_buf()),
        ),
        MediaKind::File | MediaKind::Video => (
            format!(
                "Sending the following {kind} to {}:\n{}",
                target.name,
                path.display()
            ),
            None,
        ),
    };
    Prompt {
        body,
        image,
        inputs: Vec::new(),
        selection: Vec::new(),
        actions: vec![
            PromptAction::new(ActionId::Yes, "Yes"),
            PromptAction::new(ActionId::No, "No"),
        ],
    }
}

pub fn target_not_found(keyword: &str) -> Prompt {
    if keyword.is_empty() {
        Prompt::notice("User not found.")
    } else {
        Prompt::notice(format!("User not found: {keyword}"))
    }
}
