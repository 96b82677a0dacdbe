use std::sync::{Arc, mpsc::Receiver};

use toastchat_core::{ErrorKind, InboundMessage, Outcome, Router, RouterError};
use tracing::{debug, info, warn};

fn log_flow(flow: &'static str, result: Result<Outcome, RouterError>) {
    match result {
        Ok(Outcome::Sent { conversation, kind }) => {
            info!(flow, chat = %conversation.name, kind, "sent")
        }
        Ok(outcome) => debug!(flow, ?outcome, "flow finished"),
        Err(err) => match err.kind() {
            ErrorKind::AmbiguousTarget => info!(flow, "no target: {}", err),
            ErrorKind::MalformedResponse => debug!(flow, "prompt abandoned: {}", err),
            ErrorKind::External => warn!(flow, "flow failed: {}", err),
        },
    }
}

/// Runs the reply flow for each pushed message, one at a time, until the
/// bridge connection closes.
pub fn run_inbound_worker(router: Arc<Router>, inbound_rx: Receiver<InboundMessage>) {
    while let Ok(message) = inbound_rx.recv() {
        debug!(message_id = %message.id, chat = %message.conversation.name, "showing message");
        log_flow("reply", router.handle_inbound(&message));
    }
    info!("inbound message stream ended");
}

/// Runs one compose flow per accepted hotkey press.
pub fn run_compose_worker(router: Arc<Router>, trigger_rx: Receiver<()>) {
    while trigger_rx.recv().is_ok() {
        log_flow("compose", router.compose());
    }
}
