//! Reply router: turns one inbound message or one hotkey press into a chain
//! of prompts and at most one send.
//!
//! [`decide`] is the pure transition table; [`Router`] renders steps,
//! blocks on the notifier and carries out the side effects it returns.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    ClipboardError, ClipboardSource, Conversation, FilesDir, InboundMessage, MediaKind,
    MessageContent, MessagingClient, MessagingError, NotFoundPolicy, OutboundPayload, Session,
    clipboard::{normalize_path_input, resolve_clipboard_path},
    prompt::{ActionId, InputId, Notifier, NotifyError, Prompt, PromptResponse},
    render,
};

/// Which prompt is on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    ReplyMenu,
    ReplyMedia(MediaKind),
    SendMenu,
    SendMedia(MediaKind),
    Confirm {
        target: Conversation,
        kind: MediaKind,
        path: PathBuf,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::ReplyMenu => "reply_menu",
            Step::ReplyMedia(_) => "reply_media",
            Step::SendMenu => "send_menu",
            Step::SendMedia(_) => "send_media",
            Step::Confirm { .. } => "confirm",
        }
    }
}

/// Recipient of a pending send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The chat the inbound message came from.
    Reply,
    /// Keyword typed into the nickname field, plus the cached chat picked in
    /// the drop-down (used only when the keyword finds nothing).
    Lookup {
        keyword: String,
        selection: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Show(Step),
    SendText {
        target: Target,
        text: String,
    },
    Confirm {
        target: Target,
        kind: MediaKind,
        path: PathBuf,
    },
    FromClipboard {
        target: Target,
        kind: MediaKind,
    },
    SendMedia {
        target: Conversation,
        kind: MediaKind,
        path: PathBuf,
    },
    Finish(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Sent {
        conversation: Conversation,
        kind: &'static str,
    },
    /// "No" on a confirmation.
    Cancelled,
    Dismissed,
    /// The attachment was handed to the OS.
    Opened,
    /// Informational toast, nothing to answer.
    Informed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AmbiguousTarget,
    MalformedResponse,
    External,
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no unique chat matches {keyword:?} ({matches} found)")]
    TargetNotFound { keyword: String, matches: usize },
    #[error("prompt answer is missing {0}")]
    MissingInput(InputId),
    #[error("action {action} is not valid on {step}")]
    UnexpectedAction {
        step: &'static str,
        action: ActionId,
    },
    #[error("reply requested without an inbound message")]
    NoReplyContext,
    #[error("clipboard holds nothing usable as a path")]
    ClipboardEmpty,
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    #[error(transparent)]
    Clipboard(#[from] ClipboardError),
    #[error("file error: {0}")]
    Io(#[from] io::Error),
}

impl RouterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RouterError::TargetNotFound { .. } => ErrorKind::AmbiguousTarget,
            RouterError::MissingInput(_)
            | RouterError::UnexpectedAction { .. }
            | RouterError::NoReplyContext => ErrorKind::MalformedResponse,
            RouterError::ClipboardEmpty
            | RouterError::Notify(_)
            | RouterError::Messaging(_)
            | RouterError::Clipboard(_)
            | RouterError::Io(_) => ErrorKind::External,
        }
    }
}

fn required(inputs: &HashMap<InputId, String>, id: InputId) -> Result<String, RouterError> {
    inputs
        .get(&id)
        .map(|value| normalize_path_input(value))
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or(RouterError::MissingInput(id))
}

fn required_text(inputs: &HashMap<InputId, String>) -> Result<String, RouterError> {
    inputs
        .get(&InputId::Message)
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .ok_or(RouterError::MissingInput(InputId::Message))
}

fn lookup(inputs: &HashMap<InputId, String>, selection: Option<String>) -> Target {
    Target::Lookup {
        keyword: inputs
            .get(&InputId::Keyword)
            .map(|value| value.trim().to_owned())
            .unwrap_or_default(),
        selection: selection.filter(|value| !value.trim().is_empty()),
    }
}

/// Transition table of the reply flow.
pub fn decide(step: &Step, response: PromptResponse) -> Result<Decision, RouterError> {
    let PromptResponse::Activated {
        action,
        inputs,
        selection,
    } = response
    else {
        return Ok(Decision::Finish(Outcome::Dismissed));
    };

    let decision = match (step, action) {
        (Step::ReplyMenu, ActionId::Reply) => Decision::SendText {
            target: Target::Reply,
            text: required_text(&inputs)?,
        },
        (Step::ReplyMenu, ActionId::SendMedia(kind)) => Decision::Show(Step::ReplyMedia(kind)),
        (Step::ReplyMenu | Step::ReplyMedia(_), ActionId::OpenFile) => {
            Decision::Finish(Outcome::Opened)
        }
        (Step::ReplyMedia(kind), ActionId::Send) => Decision::Confirm {
            target: Target::Reply,
            kind: *kind,
            path: PathBuf::from(required(&inputs, InputId::MediaPath(*kind))?),
        },
        (Step::ReplyMedia(kind), ActionId::FromClipboard) => Decision::FromClipboard {
            target: Target::Reply,
            kind: *kind,
        },
        (Step::ReplyMedia(_), ActionId::Back) => Decision::Show(Step::ReplyMenu),
        (Step::SendMenu, ActionId::Send) => Decision::SendText {
            text: required_text(&inputs)?,
            target: lookup(&inputs, selection),
        },
        (Step::SendMenu, ActionId::SendMedia(kind)) => Decision::Show(Step::SendMedia(kind)),
        (Step::SendMedia(kind), ActionId::Send) => Decision::Confirm {
            path: PathBuf::from(required(&inputs, InputId::MediaPath(*kind))?),
            target: lookup(&inputs, selection),
            kind: *kind,
        },
        (Step::SendMedia(kind), ActionId::FromClipboard) => Decision::FromClipboard {
            target: lookup(&inputs, selection),
            kind: *kind,
        },
        (Step::SendMedia(_), ActionId::Back) => Decision::Show(Step::SendMenu),
        (Step::Confirm { target, kind, path }, ActionId::Yes) => Decision::SendMedia {
            target: target.clone(),
            kind: *kind,
            path: path.clone(),
        },
        (Step::Confirm { .. }, ActionId::No) => Decision::Finish(Outcome::Cancelled),
        (step, action) => {
            return Err(RouterError::UnexpectedAction {
                step: step.name(),
                action,
            });
        }
    };
    Ok(decision)
}

/// State of one routing round trip.
struct Flow<'a> {
    message: Option<&'a InboundMessage>,
    attachment: Option<PathBuf>,
    fetch_failed: bool,
}

pub struct Router {
    messaging: Arc<dyn MessagingClient>,
    notifier: Arc<dyn Notifier>,
    clipboard: Arc<dyn ClipboardSource>,
    session: Arc<Session>,
    files: FilesDir,
    not_found: NotFoundPolicy,
}

impl Router {
    pub fn new(
        messaging: Arc<dyn MessagingClient>,
        notifier: Arc<dyn Notifier>,
        clipboard: Arc<dyn ClipboardSource>,
        session: Arc<Session>,
        files: FilesDir,
    ) -> Self {
        Self {
            messaging,
            notifier,
            clipboard,
            session,
            files,
            not_found: NotFoundPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_not_found_policy(mut self, policy: NotFoundPolicy) -> Self {
        self.not_found = policy;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Shows the reply menu for `message` and follows the user's answers.
    pub fn handle_inbound(&self, message: &InboundMessage) -> Result<Outcome, RouterError> {
        self.session.touch(message.conversation.clone());

        if let MessageContent::Unsupported { type_name } = &message.content {
            debug!(type_name = %type_name, "unsupported message type");
            self.notifier
                .prompt(&Prompt::notice(render::message_header(message)))?;
            return Ok(Outcome::Informed);
        }

        let flow = Flow {
            message: Some(message),
            attachment: None,
            fetch_failed: false,
        };
        self.run(flow, Step::ReplyMenu)
    }

    /// Outbound flow started from the hotkey.
    pub fn compose(&self) -> Result<Outcome, RouterError> {
        let flow = Flow {
            message: None,
            attachment: None,
            fetch_failed: false,
        };
        self.run(flow, Step::SendMenu)
    }

    fn run(&self, mut flow: Flow<'_>, mut step: Step) -> Result<Outcome, RouterError> {
        loop {
            let prompt = self.render(&mut flow, &step)?;
            let response = self.notifier.prompt(&prompt)?;
            let decision = decide(&step, response)?;
            debug!(step = step.name(), ?decision, "prompt answered");

            step = match decision {
                Decision::Show(next) => next,
                Decision::SendText { target, text } => {
                    let conversation = self.resolve_target(&flow, target)?;
                    return self.send(conversation, OutboundPayload::Text { text });
                }
                Decision::Confirm { target, kind, path } => Step::Confirm {
                    target: self.resolve_target(&flow, target)?,
                    kind,
                    path,
                },
                Decision::FromClipboard { target, kind } => {
                    let target = self.resolve_target(&flow, target)?;
                    let path = resolve_clipboard_path(kind, self.clipboard.as_ref(), &self.files)?;
                    Step::Confirm { target, kind, path }
                }
                Decision::SendMedia { target, kind, path } => {
                    ensure_readable(&path)?;
                    return self.send(target, OutboundPayload::Media { kind, path });
                }
                Decision::Finish(outcome) => return Ok(outcome),
            };
        }
    }

    fn render(&self, flow: &mut Flow<'_>, step: &Step) -> Result<Prompt, RouterError> {
        let prompt = match step {
            Step::ReplyMenu => {
                let message = flow.message.ok_or(RouterError::NoReplyContext)?;
                render::reply_menu(message, self.attachment(flow).as_deref())
            }
            Step::ReplyMedia(kind) => {
                let message = flow.message.ok_or(RouterError::NoReplyContext)?;
                render::reply_media(message, *kind, self.attachment(flow).as_deref())
            }
            Step::SendMenu => render::send_menu(&self.recent_first()),
            Step::SendMedia(kind) => render::send_media(*kind, &self.recent_first()),
            Step::Confirm { target, kind, path } => render::confirm(target, *kind, path),
        };
        Ok(prompt)
    }

    /// Fetches the message payload on first use; later steps reuse the file.
    /// A failed download is logged once and the menus render without it.
    fn attachment(&self, flow: &mut Flow<'_>) -> Option<PathBuf> {
        if flow.attachment.is_some() || flow.fetch_failed {
            return flow.attachment.clone();
        }
        let message = flow.message?;
        let file_name = message.attachment_file_name()?;

        match self.fetch(message, file_name) {
            Ok(dest) => {
                debug!(message_id = %message.id, path = %dest.display(), "attachment fetched");
                flow.attachment = Some(dest);
            }
            Err(err) => {
                warn!(message_id = %message.id, "attachment fetch failed: {}", err);
                flow.fetch_failed = true;
            }
        }
        flow.attachment.clone()
    }

    fn fetch(&self, message: &InboundMessage, file_name: &str) -> Result<PathBuf, RouterError> {
        self.files.ensure()?;
        let dest = self.files.attachment_path(file_name);
        self.messaging.fetch_attachment(message, &dest)?;
        Ok(dest)
    }

    fn recent_first(&self) -> Vec<String> {
        let mut names = self.session.recent_names();
        names.reverse();
        names
    }

    fn resolve_target(&self, flow: &Flow<'_>, target: Target) -> Result<Conversation, RouterError> {
        let (keyword, selection) = match target {
            Target::Reply => {
                return flow
                    .message
                    .map(|message| message.conversation.clone())
                    .ok_or(RouterError::NoReplyContext);
            }
            Target::Lookup { keyword, selection } => (keyword, selection),
        };

        // The cached-chat list only counts when the nickname field is blank.
        let mut matches = 0;
        if keyword.is_empty() {
            if let Some(cached) = selection
                .as_deref()
                .and_then(|name| self.session.find_recent(name))
            {
                return Ok(cached);
            }
        } else {
            let found = self.messaging.search(&keyword)?;
            matches = found.len();
            if let [only] = found.as_slice() {
                return Ok(only.clone());
            }
            debug!(keyword = %keyword, matches, "keyword is not unique");
        }

        if self.not_found == NotFoundPolicy::Notify {
            if let Err(err) = self.notifier.prompt(&render::target_not_found(&keyword)) {
                warn!("not-found notice failed: {}", err);
            }
        }
        Err(RouterError::TargetNotFound { keyword, matches })
    }

    fn send(
        &self,
        conversation: Conversation,
        payload: OutboundPayload,
    ) -> Result<Outcome, RouterError> {
        self.messaging.send(&conversation, &payload)?;
        info!(
            conversation = %conversation.name,
            kind = payload.kind_label(),
            "sent"
        );
        self.session.touch(conversation.clone());
        Ok(Outcome::Sent {
            conversation,
            kind: payload.kind_label(),
        })
    }
}

fn ensure_readable(path: &Path) -> Result<(), RouterError> {
    let meta = std::fs::metadata(path)?;
    if !meta.is_file() {
        return Err(RouterError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a file", path.display()),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use super::*;
    use crate::{AttachmentKind, clipboard::tests::MemoryClipboard};

    #[derive(Default)]
    struct FakeMessaging {
        chats: Vec<Conversation>,
        sent: Mutex<Vec<(Conversation, OutboundPayload)>>,
        fetched: Mutex<Vec<PathBuf>>,
        fail_send: bool,
        fail_fetch: bool,
    }

    impl FakeMessaging {
        fn with_chats(names: &[&str]) -> Self {
            Self {
                chats: names
                    .iter()
                    .map(|name| Conversation {
                        id: format!("id-{name}"),
                        name: (*name).to_owned(),
                    })
                    .collect(),
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<(Conversation, OutboundPayload)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl MessagingClient for FakeMessaging {
        fn search(&self, keyword: &str) -> Result<Vec<Conversation>, MessagingError> {
            Ok(self
                .chats
                .iter()
                .filter(|chat| chat.name.contains(keyword))
                .cloned()
                .collect())
        }

        fn send(
            &self,
            conversation: &Conversation,
            payload: &OutboundPayload,
        ) -> Result<(), MessagingError> {
            if self.fail_send {
                return Err(MessagingError::Closed);
            }
            self.sent
                .lock()
                .unwrap()
                .push((conversation.clone(), payload.clone()));
            Ok(())
        }

        fn fetch_attachment(
            &self,
            _message: &InboundMessage,
            dest: &Path,
        ) -> Result<(), MessagingError> {
            if self.fail_fetch {
                self.fetched.lock().unwrap().push(dest.to_path_buf());
                return Err(MessagingError::Rejected("no attachment".to_owned()));
            }
            std::fs::write(dest, b"payload")?;
            self.fetched.lock().unwrap().push(dest.to_path_buf());
            Ok(())
        }
    }

    /// Replays scripted answers and records every prompt shown.
    #[derive(Default)]
    struct ScriptedNotifier {
        answers: Mutex<VecDeque<PromptResponse>>,
        shown: Mutex<Vec<Prompt>>,
    }

    impl ScriptedNotifier {
        fn new(answers: impl IntoIterator<Item = PromptResponse>) -> Self {
            Self {
                answers: Mutex::new(answers.into_iter().collect()),
                shown: Mutex::default(),
            }
        }

        fn shown(&self) -> Vec<Prompt> {
            self.shown.lock().unwrap().clone()
        }
    }

    impl Notifier for ScriptedNotifier {
        fn prompt(&self, prompt: &Prompt) -> Result<PromptResponse, NotifyError> {
            self.shown.lock().unwrap().push(prompt.clone());
            Ok(self
                .answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(PromptResponse::Dismissed))
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        files: FilesDir,
        messaging: Arc<FakeMessaging>,
        notifier: Arc<ScriptedNotifier>,
        router: Router,
    }

    fn harness(
        messaging: FakeMessaging,
        answers: Vec<PromptResponse>,
        clipboard: MemoryClipboard,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let files = FilesDir::new(dir.path().join("Files")).unwrap();
        let messaging = Arc::new(messaging);
        let notifier = Arc::new(ScriptedNotifier::new(answers));
        let router = Router::new(
            messaging.clone(),
            notifier.clone(),
            Arc::new(clipboard),
            Arc::new(Session::new()),
            files.clone(),
        );
        Harness {
            _dir: dir,
            files,
            messaging,
            notifier,
            router,
        }
    }

    fn text_message(text: &str) -> InboundMessage {
        InboundMessage {
            id: "m-1".to_owned(),
            conversation: Conversation {
                id: "id-Alice".to_owned(),
                name: "Alice".to_owned(),
            },
            sender_name: "Alice".to_owned(),
            content: MessageContent::Text {
                text: text.to_owned(),
            },
        }
    }

    fn media_file(h: &Harness, name: &str) -> PathBuf {
        h.files.ensure().unwrap();
        let path = h.files.root().join(name);
        std::fs::write(&path, b"bytes").unwrap();
        path
    }

    #[test]
    fn inbound_text_shows_reply_menu_before_any_send() {
        let h = harness(
            FakeMessaging::default(),
            vec![PromptResponse::Dismissed],
            MemoryClipboard::default(),
        );
        let outcome = h.router.handle_inbound(&text_message("hi")).unwrap();

        assert_eq!(outcome, Outcome::Dismissed);
        let shown = h.notifier.shown();
        assert_eq!(shown.len(), 1);
        assert_eq!(
            shown[0].action_ids(),
            [
                ActionId::Reply,
                ActionId::SendMedia(MediaKind::Image),
                ActionId::SendMedia(MediaKind::File),
                ActionId::SendMedia(MediaKind::Video),
            ]
        );
        assert!(h.messaging.sent().is_empty());
        assert_eq!(h.router.session().recent_names(), ["Alice"]);
    }

    #[test]
    fn reply_sends_text_to_originating_chat() {
        let h = harness(
            FakeMessaging::default(),
            vec![PromptResponse::action(ActionId::Reply).with_input(InputId::Message, "on my way")],
            MemoryClipboard::default(),
        );
        let outcome = h.router.handle_inbound(&text_message("where?")).unwrap();

        let sent = h.messaging.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.name, "Alice");
        assert_eq!(
            sent[0].1,
            OutboundPayload::Text {
                text: "on my way".to_owned()
            }
        );
        assert!(matches!(outcome, Outcome::Sent { kind: "text", .. }));
    }

    #[test]
    fn blank_reply_is_malformed_and_sends_nothing() {
        let h = harness(
            FakeMessaging::default(),
            vec![PromptResponse::action(ActionId::Reply).with_input(InputId::Message, "  ")],
            MemoryClipboard::default(),
        );
        let err = h.router.handle_inbound(&text_message("?")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert!(h.messaging.sent().is_empty());
    }

    #[test]
    fn back_from_media_prompt_returns_to_reply_menu() {
        let h = harness(
            FakeMessaging::default(),
            vec![
                PromptResponse::action(ActionId::SendMedia(MediaKind::File)),
                PromptResponse::action(ActionId::Back),
                PromptResponse::Dismissed,
            ],
            MemoryClipboard::default(),
        );
        h.router.handle_inbound(&text_message("x")).unwrap();

        let shown = h.notifier.shown();
        assert_eq!(shown.len(), 3);
        assert_eq!(shown[1].inputs, [InputId::MediaPath(MediaKind::File)]);
        assert_eq!(shown[2], shown[0]);
    }

    #[test]
    fn back_from_outbound_media_returns_to_send_menu() {
        let decision = decide(
            &Step::SendMedia(MediaKind::Video),
            PromptResponse::action(ActionId::Back),
        )
        .unwrap();
        assert_eq!(decision, Decision::Show(Step::SendMenu));

        let decision = decide(
            &Step::ReplyMedia(MediaKind::Video),
            PromptResponse::action(ActionId::Back),
        )
        .unwrap();
        assert_eq!(decision, Decision::Show(Step::ReplyMenu));
    }

    #[test]
    fn typed_image_path_is_confirmed_then_sent() {
        let mut h = harness(FakeMessaging::default(), Vec::new(), MemoryClipboard::default());
        let path = media_file(&h, "cat.png");
        h.notifier = Arc::new(ScriptedNotifier::new([
            PromptResponse::action(ActionId::SendMedia(MediaKind::Image)),
            PromptResponse::action(ActionId::Send).with_input(
                InputId::MediaPath(MediaKind::Image),
                format!("\"{}\"", path.display()),
            ),
            PromptResponse::action(ActionId::Yes),
        ]));
        h.router = Router::new(
            h.messaging.clone(),
            h.notifier.clone(),
            Arc::new(MemoryClipboard::default()),
            Arc::new(Session::new()),
            h.files.clone(),
        );

        h.router.handle_inbound(&text_message("send pic")).unwrap();

        let shown = h.notifier.shown();
        assert_eq!(shown[2].body, "Sending the following image to Alice:");
        assert_eq!(shown[2].image.as_deref(), Some(path.as_path()));
        assert_eq!(
            h.messaging.sent()[0].1,
            OutboundPayload::Media {
                kind: MediaKind::Image,
                path,
            }
        );
    }

    #[test]
    fn declined_confirmation_sends_nothing() {
        let h = harness(
            FakeMessaging::default(),
            vec![
                PromptResponse::action(ActionId::SendMedia(MediaKind::File)),
                PromptResponse::action(ActionId::FromClipboard),
                PromptResponse::action(ActionId::No),
            ],
            MemoryClipboard::text("report.pdf"),
        );
        let outcome = h.router.handle_inbound(&text_message("file?")).unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
        assert!(h.messaging.sent().is_empty());
        assert_eq!(
            h.notifier.shown()[2].body,
            "Sending the following file to Alice:\nreport.pdf"
        );
    }

    #[test]
    fn confirmed_send_of_missing_file_is_an_io_error() {
        let h = harness(
            FakeMessaging::default(),
            vec![
                PromptResponse::action(ActionId::SendMedia(MediaKind::Video)),
                PromptResponse::action(ActionId::FromClipboard),
                PromptResponse::action(ActionId::Yes),
            ],
            MemoryClipboard::text("/definitely/not/here.mp4"),
        );
        let err = h.router.handle_inbound(&text_message("v")).unwrap_err();
        assert!(matches!(err, RouterError::Io(_)));
        assert!(h.messaging.sent().is_empty());
    }

    #[test]
    fn picture_attachment_is_fetched_once_per_flow() {
        let h = harness(
            FakeMessaging::default(),
            vec![
                PromptResponse::action(ActionId::SendMedia(MediaKind::Image)),
                PromptResponse::action(ActionId::Back),
                PromptResponse::Dismissed,
            ],
            MemoryClipboard::default(),
        );
        let mut message = text_message("");
        message.content = MessageContent::Picture {
            file_name: "photo.jpg".to_owned(),
        };
        h.router.handle_inbound(&message).unwrap();

        let fetched = h.messaging.fetched.lock().unwrap().clone();
        assert_eq!(fetched, [h.files.attachment_path("photo.jpg")]);
        assert!(
            h.notifier
                .shown()
                .iter()
                .all(|prompt| prompt.image.as_deref() == Some(fetched[0].as_path()))
        );
    }

    #[test]
    fn failed_download_still_offers_the_reply_menu() {
        let h = harness(
            FakeMessaging {
                fail_fetch: true,
                ..FakeMessaging::default()
            },
            vec![
                PromptResponse::action(ActionId::SendMedia(MediaKind::File)),
                PromptResponse::action(ActionId::Back),
                PromptResponse::action(ActionId::Reply).with_input(InputId::Message, "resend?"),
            ],
            MemoryClipboard::default(),
        );
        let mut message = text_message("");
        message.content = MessageContent::Attachment {
            kind: AttachmentKind::Attachment,
            file_name: "notes.txt".to_owned(),
        };
        let outcome = h.router.handle_inbound(&message).unwrap();

        assert!(matches!(outcome, Outcome::Sent { kind: "text", .. }));
        assert_eq!(h.messaging.fetched.lock().unwrap().len(), 1);
        let shown = h.notifier.shown();
        assert_eq!(shown.len(), 3);
        for prompt in &shown {
            assert!(prompt.image.is_none());
            assert!(prompt.actions.iter().all(|action| action.id != ActionId::OpenFile));
        }
        assert_eq!(shown[0].actions[0].id, ActionId::Reply);
    }

    #[test]
    fn open_file_ends_the_flow() {
        let h = harness(
            FakeMessaging::default(),
            vec![PromptResponse::action(ActionId::OpenFile)],
            MemoryClipboard::default(),
        );
        let mut message = text_message("");
        message.content = MessageContent::Attachment {
            kind: AttachmentKind::Attachment,
            file_name: "notes.txt".to_owned(),
        };
        assert_eq!(h.router.handle_inbound(&message).unwrap(), Outcome::Opened);
    }

    #[test]
    fn unsupported_message_only_informs() {
        let h = harness(FakeMessaging::default(), Vec::new(), MemoryClipboard::default());
        let mut message = text_message("");
        message.content = MessageContent::Unsupported {
            type_name: "Map".to_owned(),
        };
        assert_eq!(h.router.handle_inbound(&message).unwrap(), Outcome::Informed);
        let shown = h.notifier.shown();
        assert_eq!(shown.len(), 1);
        assert!(shown[0].actions.is_empty());
    }

    #[test]
    fn unique_keyword_sends_exactly_once() {
        let h = harness(
            FakeMessaging::with_chats(&["Bob", "Carol"]),
            vec![
                PromptResponse::action(ActionId::Send)
                    .with_input(InputId::Keyword, "Bo")
                    .with_input(InputId::Message, "hello"),
            ],
            MemoryClipboard::default(),
        );
        h.router.compose().unwrap();

        let sent = h.messaging.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.name, "Bob");
        assert_eq!(
            sent[0].1,
            OutboundPayload::Text {
                text: "hello".to_owned()
            }
        );
        assert_eq!(h.router.session().recent_names(), ["Bob"]);
    }

    #[test]
    fn unknown_keyword_sends_nothing_and_notifies() {
        let h = harness(
            FakeMessaging::with_chats(&["Bob"]),
            vec![
                PromptResponse::action(ActionId::Send)
                    .with_input(InputId::Keyword, "Zed")
                    .with_input(InputId::Message, "hello"),
            ],
            MemoryClipboard::default(),
        );
        let err = h.router.compose().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AmbiguousTarget);
        assert!(h.messaging.sent().is_empty());
        let shown = h.notifier.shown();
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[1].body, "User not found: Zed");
    }

    #[test]
    fn silent_policy_skips_not_found_notice() {
        let mut h = harness(
            FakeMessaging::with_chats(&["Bob", "Bobby"]),
            vec![
                PromptResponse::action(ActionId::Send)
                    .with_input(InputId::Keyword, "Bob")
                    .with_input(InputId::Message, "hello"),
            ],
            MemoryClipboard::default(),
        );
        h.router = Router::new(
            h.messaging.clone(),
            h.notifier.clone(),
            Arc::new(MemoryClipboard::default()),
            Arc::new(Session::new()),
            h.files.clone(),
        )
        .with_not_found_policy(NotFoundPolicy::Silent);

        let err = h.router.compose().unwrap_err();
        assert!(matches!(
            err,
            RouterError::TargetNotFound { matches: 2, .. }
        ));
        assert_eq!(h.notifier.shown().len(), 1);
        assert!(h.messaging.sent().is_empty());
    }

    #[test]
    fn cached_selection_is_used_when_keyword_is_blank() {
        let h = harness(
            FakeMessaging::default(),
            vec![
                PromptResponse::Dismissed,
                PromptResponse::action(ActionId::Send)
                    .with_input(InputId::Keyword, "")
                    .with_input(InputId::Message, "see you")
                    .with_selection("Alice"),
            ],
            MemoryClipboard::default(),
        );
        h.router.handle_inbound(&text_message("bye")).unwrap();
        h.router.compose().unwrap();

        let shown = h.notifier.shown();
        assert_eq!(shown[1].selection, ["Alice"]);
        let sent = h.messaging.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.id, "id-Alice");
    }

    #[test]
    fn unmatched_keyword_ignores_cached_selection() {
        let h = harness(
            FakeMessaging::with_chats(&["Bob"]),
            vec![
                PromptResponse::Dismissed,
                PromptResponse::action(ActionId::Send)
                    .with_input(InputId::Keyword, "Zed")
                    .with_input(InputId::Message, "meant for Zed")
                    .with_selection("Alice"),
            ],
            MemoryClipboard::default(),
        );
        h.router.handle_inbound(&text_message("hi")).unwrap();
        let err = h.router.compose().unwrap_err();

        assert!(matches!(
            err,
            RouterError::TargetNotFound { ref keyword, matches: 0 } if keyword == "Zed"
        ));
        assert!(h.messaging.sent().is_empty());
        assert_eq!(h.notifier.shown()[2].body, "User not found: Zed");
    }

    #[test]
    fn outbound_clipboard_image_is_confirmed_for_resolved_target() {
        let h = harness(
            FakeMessaging::with_chats(&["Dana"]),
            vec![
                PromptResponse::action(ActionId::SendMedia(MediaKind::Image)),
                PromptResponse::action(ActionId::FromClipboard)
                    .with_input(InputId::Keyword, "Dana"),
                PromptResponse::action(ActionId::Yes),
            ],
            MemoryClipboard {
                image: Some(b"png".to_vec()),
                ..MemoryClipboard::default()
            },
        );
        let outcome = h.router.compose().unwrap();

        let sent = h.messaging.sent();
        assert_eq!(sent.len(), 1);
        let OutboundPayload::Media { kind, path } = &sent[0].1 else {
            panic!("expected media payload");
        };
        assert_eq!(*kind, MediaKind::Image);
        assert!(path.starts_with(h.files.root()));
        assert!(matches!(outcome, Outcome::Sent { kind: "image", .. }));
    }

    #[test]
    fn messaging_failure_is_external() {
        let h = harness(
            FakeMessaging {
                fail_send: true,
                ..FakeMessaging::default()
            },
            vec![PromptResponse::action(ActionId::Reply).with_input(InputId::Message, "ok")],
            MemoryClipboard::default(),
        );
        let err = h.router.handle_inbound(&text_message("?")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::External);
        assert_eq!(h.router.session().recent_names(), ["Alice"]);
    }

    #[test]
    fn foreign_action_is_rejected() {
        let err = decide(&Step::SendMenu, PromptResponse::action(ActionId::Yes)).unwrap_err();
        assert!(matches!(
            err,
            RouterError::UnexpectedAction {
                step: "send_menu",
                action: ActionId::Yes
            }
        ));
    }
}
