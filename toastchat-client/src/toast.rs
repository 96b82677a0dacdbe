//! Windows toast rendering of [`Prompt`]s.
//!
//! The XML payload is built by a plain function so the layout can be tested
//! on any platform; only [`ToastNotifier`] talks to the WinRT APIs.

use std::{fmt::Write as _, path::Path};

use toastchat_core::{Prompt, PromptAction};
use url::Url;

/// Id of the drop-down listing cached chats.
pub const SELECTION_INPUT_ID: &str = "selection";

/// Drop-down entry that picks no cached chat. It is the default so an
/// untouched drop-down never names a recipient.
const NO_SELECTION_ID: &str = "none";

fn selection_entry_id(index: usize) -> String {
    format!("chat-{index}")
}

/// Maps a drop-down entry id back to the cached chat name it lists.
pub fn selected_chat(selection: &[String], entry_id: &str) -> Option<String> {
    let index: usize = entry_id.strip_prefix("chat-")?.parse().ok()?;
    selection.get(index).cloned()
}

fn xml_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            _ => result.push(c),
        }
    }
    result
}

fn xml_escape_attr(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(c),
        }
    }
    result
}

fn file_uri(path: &Path) -> String {
    Url::from_file_path(path)
        .map(String::from)
        .unwrap_or_else(|()| path.display().to_string())
}

fn push_action(xml: &mut String, action: &PromptAction) {
    let label = xml_escape_attr(&action.label);
    match &action.open {
        Some(path) => {
            let _ = write!(
                xml,
                r#"<action content="{label}" activationType="protocol" arguments="{}"/>"#,
                xml_escape_attr(&file_uri(path))
            );
        }
        None => {
            let _ = write!(
                xml,
                r#"<action content="{label}" activationType="foreground" arguments="{}""#,
                xml_escape_attr(&action.id.as_argument())
            );
            if let Some(input) = action.input_hint {
                let _ = write!(xml, r#" hint-inputId="{}""#, input.as_str());
            }
            xml.push_str("/>");
        }
    }
}

/// Toast XML for `prompt` under the heading `title`.
///
/// Clicking the toast body activates it with an empty argument, which never
/// parses as a button and is therefore read as a dismissal.
pub fn toast_xml(title: &str, prompt: &Prompt) -> String {
    let mut xml = String::with_capacity(512);
    xml.push_str(r#"<toast duration="long" activationType="foreground" launch="">"#);
    xml.push_str(r#"<visual><binding template="ToastGeneric">"#);
    let _ = write!(xml, "<text>{}</text>", xml_escape(title));
    let _ = write!(xml, "<text>{}</text>", xml_escape(&prompt.body));
    if let Some(image) = &prompt.image {
        let _ = write!(
            xml,
            r#"<image placement="hero" src="{}"/>"#,
            xml_escape_attr(&file_uri(image))
        );
    }
    xml.push_str("</binding></visual>");

    let interactive =
        !prompt.inputs.is_empty() || !prompt.selection.is_empty() || !prompt.actions.is_empty();
    if interactive {
        xml.push_str("<actions>");
        for input in &prompt.inputs {
            let _ = write!(
                xml,
                r#"<input id="{}" type="text" placeHolderContent="{}"/>"#,
                input.as_str(),
                xml_escape_attr(input.placeholder())
            );
        }
        if !prompt.selection.is_empty() {
            let _ = write!(
                xml,
                r#"<input id="{SELECTION_INPUT_ID}" type="selection" defaultInput="{NO_SELECTION_ID}">"#
            );
            let _ = write!(
                xml,
                r#"<selection id="{NO_SELECTION_ID}" content="(no cached chat)"/>"#
            );
            for (index, name) in prompt.selection.iter().enumerate() {
                let _ = write!(
                    xml,
                    r#"<selection id="{}" content="{}"/>"#,
                    selection_entry_id(index),
                    xml_escape_attr(name)
                );
            }
            xml.push_str("</input>");
        }
        for action in &prompt.actions {
            push_action(&mut xml, action);
        }
        xml.push_str("</actions>");
    }

    xml.push_str("</toast>");
    xml
}

#[cfg(target_os = "windows")]
pub use windows_toast::ToastNotifier;

#[cfg(target_os = "windows")]
mod windows_toast {
    use std::{
        collections::HashMap,
        sync::mpsc::{self, RecvTimeoutError},
        time::Duration,
    };

    use toastchat_core::{ActionId, InputId, Notifier, NotifyError, Prompt, PromptResponse};
    use tracing::{debug, warn};
    use windows::{
        Data::Xml::Dom::XmlDocument,
        Foundation::{Collections::ValueSet, TypedEventHandler},
        UI::Notifications::{
            ToastActivatedEventArgs, ToastDismissedEventArgs, ToastFailedEventArgs,
            ToastNotification, ToastNotificationManager,
        },
        core::{HSTRING, IInspectable, Interface},
    };

    use super::{SELECTION_INPUT_ID, toast_xml};

    /// Upper bound on waiting for an answer; the shell normally reports a
    /// dismissal long before this.
    const PROMPT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

    pub struct ToastNotifier {
        app_id: HSTRING,
        title: String,
    }

    impl ToastNotifier {
        pub fn new(app_id: &str, title: &str) -> Self {
            Self {
                app_id: HSTRING::from(app_id),
                title: title.to_owned(),
            }
        }
    }

    fn win_err(err: windows::core::Error) -> NotifyError {
        NotifyError(err.to_string())
    }

    fn read_string(values: &ValueSet, key: &str) -> windows::core::Result<Option<String>> {
        let key = HSTRING::from(key);
        if !values.HasKey(&key)? {
            return Ok(None);
        }
        let value = values.Lookup(&key)?;
        Ok(Some(HSTRING::try_from(&value)?.to_string()))
    }

    fn read_activation(
        args: &IInspectable,
        input_ids: &[InputId],
        selection: &[String],
    ) -> windows::core::Result<PromptResponse> {
        let args: ToastActivatedEventArgs = args.cast()?;
        let argument = args.Arguments()?.to_string();
        let Some(action) = ActionId::parse_argument(&argument) else {
            debug!(argument, "toast body activated");
            return Ok(PromptResponse::Dismissed);
        };

        let user_input = args.UserInput()?;
        let mut inputs = HashMap::new();
        for id in input_ids {
            if let Some(value) = read_string(&user_input, id.as_str())? {
                inputs.insert(*id, value);
            }
        }
        let selection = if selection.is_empty() {
            None
        } else {
            read_string(&user_input, SELECTION_INPUT_ID)?
                .and_then(|entry_id| selected_chat(selection, &entry_id))
        };

        Ok(PromptResponse::Activated {
            action,
            inputs,
            selection,
        })
    }

    impl Notifier for ToastNotifier {
        fn prompt(&self, prompt: &Prompt) -> Result<PromptResponse, NotifyError> {
            let xml = toast_xml(&self.title, prompt);
            let doc = XmlDocument::new().map_err(win_err)?;
            doc.LoadXml(&HSTRING::from(xml.as_str())).map_err(win_err)?;
            let toast = ToastNotification::CreateToastNotification(&doc).map_err(win_err)?;

            let (tx, rx) = mpsc::channel::<Result<PromptResponse, String>>();

            let activated_tx = tx.clone();
            let input_ids = prompt.inputs.clone();
            let selection = prompt.selection.clone();
            toast
                .Activated(&TypedEventHandler::<ToastNotification, IInspectable>::new(
                    move |_, args| {
                        let response = match args.as_ref() {
                            Some(args) => read_activation(args, &input_ids, &selection)
                                .map_err(|err| err.to_string()),
                            None => Ok(PromptResponse::Dismissed),
                        };
                        let _ = activated_tx.send(response);
                        Ok(())
                    },
                ))
                .map_err(win_err)?;

            let dismissed_tx = tx.clone();
            toast
                .Dismissed(&TypedEventHandler::<
                    ToastNotification,
                    ToastDismissedEventArgs,
                >::new(move |_, _| {
                    let _ = dismissed_tx.send(Ok(PromptResponse::Dismissed));
                    Ok(())
                }))
                .map_err(win_err)?;

            toast
                .Failed(&TypedEventHandler::<ToastNotification, ToastFailedEventArgs>::new(
                    move |_, args| {
                        let reason = args
                            .as_ref()
                            .and_then(|args| args.ErrorCode().ok())
                            .map(|code| format!("toast failed: {code:?}"))
                            .unwrap_or_else(|| "toast failed".to_owned());
                        let _ = tx.send(Err(reason));
                        Ok(())
                    },
                ))
                .map_err(win_err)?;

            let notifier =
                ToastNotificationManager::CreateToastNotifierWithId(&self.app_id).map_err(win_err)?;
            notifier.Show(&toast).map_err(win_err)?;

            match rx.recv_timeout(PROMPT_TIMEOUT) {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(reason)) => Err(NotifyError(reason)),
                Err(RecvTimeoutError::Timeout) => {
                    warn!("toast unanswered after {:?}; hiding it", PROMPT_TIMEOUT);
                    let _ = notifier.Hide(&toast);
                    Ok(PromptResponse::Dismissed)
                }
                Err(RecvTimeoutError::Disconnected) => Ok(PromptResponse::Dismissed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use toastchat_core::{ActionId, InputId, MediaKind, PromptAction};

    use super::*;

    #[test]
    fn notice_has_no_actions_block() {
        let xml = toast_xml("ToastChat", &Prompt::notice("User not found: Bob"));
        assert!(xml.contains("<text>User not found: Bob</text>"));
        assert!(!xml.contains("<actions>"));
    }

    #[test]
    fn body_and_labels_are_escaped() {
        let prompt = Prompt {
            body: "A&B <team>: \"hi\"".to_owned(),
            actions: vec![PromptAction::new(ActionId::Reply, "Say \"hi\"")],
            ..Prompt::default()
        };
        let xml = toast_xml("T", &prompt);
        assert!(xml.contains("<text>A&amp;B &lt;team&gt;: \"hi\"</text>"));
        assert!(xml.contains(r#"content="Say &quot;hi&quot;""#));
    }

    #[test]
    fn compose_prompt_lists_inputs_selection_and_buttons() {
        let input = InputId::MediaPath(MediaKind::Image);
        let prompt = Prompt {
            body: "Send an image.".to_owned(),
            image: None,
            inputs: vec![InputId::Keyword, input],
            selection: vec!["Bob".to_owned(), "Team <3".to_owned()],
            actions: vec![
                PromptAction::new(ActionId::Send, "Send").beside(input),
                PromptAction::new(ActionId::Back, "Back"),
            ],
        };
        let xml = toast_xml("ToastChat", &prompt);

        assert!(xml.contains(
            r#"<input id="keyword" type="text" placeHolderContent="Nickname, remark, etc."/>"#
        ));
        assert!(xml.contains(r#"<input id="path-image" type="text""#));
        assert!(xml.contains(r#"<input id="selection" type="selection" defaultInput="none">"#));
        assert!(xml.contains(r#"<selection id="chat-1" content="Team &lt;3"/>"#));
        assert!(xml.contains(
            r#"<action content="Send" activationType="foreground" arguments="send" hint-inputId="path-image"/>"#
        ));
        assert!(xml.contains(r#"arguments="back"/>"#));
        assert!(xml.ends_with("</actions></toast>"));
    }

    #[test]
    fn untouched_drop_down_names_no_chat() {
        let selection = vec!["Bob".to_owned(), "Carol".to_owned()];
        let prompt = Prompt {
            selection: selection.clone(),
            actions: vec![PromptAction::new(ActionId::Send, "Send")],
            ..Prompt::default()
        };
        let xml = toast_xml("ToastChat", &prompt);
        assert!(!xml.contains(r#"defaultInput="chat-"#));

        assert_eq!(selected_chat(&selection, NO_SELECTION_ID), None);
        assert_eq!(selected_chat(&selection, "chat-1").as_deref(), Some("Carol"));
        assert_eq!(selected_chat(&selection, "chat-2"), None);
        assert_eq!(selected_chat(&selection, "Bob"), None);
    }

    #[cfg(unix)]
    #[test]
    fn file_references_become_uris() {
        let path = PathBuf::from("/tmp/Files/a b.png");
        let prompt = Prompt {
            body: "Team(Ann):".to_owned(),
            image: Some(path.clone()),
            actions: vec![PromptAction::new(ActionId::OpenFile, "Open file").opening(path)],
            ..Prompt::default()
        };
        let xml = toast_xml("ToastChat", &prompt);
        assert!(xml.contains(r#"<image placement="hero" src="file:///tmp/Files/a%20b.png"/>"#));
        assert!(xml.contains(
            r#"<action content="Open file" activationType="protocol" arguments="file:///tmp/Files/a%20b.png"/>"#
        ));
    }
}
