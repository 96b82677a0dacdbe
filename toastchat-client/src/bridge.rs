//! WebSocket client for the chat bridge.
//!
//! The bridge is a small companion process that drives the actual chat
//! client. Requests carry a numeric id and the bridge answers each one with a
//! single event holding the same id; chat messages are pushed without an id.

use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use base64::Engine;
use futures::{SinkExt, StreamExt};
use tokio::{
    runtime::Runtime,
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use toastchat_core::{
    BridgeEvent, BridgeRequest, Conversation, InboundMessage, MAX_ATTACHMENT_BYTES,
    MessagingClient, MessagingError, OutboundPayload, RequestId, decode_event,
    decoded_len_estimate, encode_request,
};

const MAX_CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(12);
const BACKOFF_BASE_MS: u64 = 200;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Attachments can be large and the bridge may have to download them first.
pub const ATTACHMENT_TIMEOUT: Duration = Duration::from_secs(120);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<BridgeEvent>>>>;

#[derive(Debug)]
pub enum BridgeError {
    InvalidUrl(String),
    Runtime(std::io::Error),
    Connect(String),
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::InvalidUrl(e) => write!(f, "invalid bridge URL: {e}"),
            BridgeError::Runtime(e) => write!(f, "tokio runtime init failed: {e}"),
            BridgeError::Connect(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BridgeError {}

pub struct BridgeClient {
    runtime: Runtime,
    outgoing: mpsc::UnboundedSender<BridgeRequest>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl BridgeClient {
    /// Connects to `url` and starts the network tasks. Pushed chat messages
    /// arrive on the returned receiver, which closes with the connection.
    ///
    /// Must not be called from within a tokio runtime.
    pub fn connect(
        url: &str,
    ) -> Result<(Self, std::sync::mpsc::Receiver<InboundMessage>), BridgeError> {
        Url::parse(url).map_err(|err| BridgeError::InvalidUrl(err.to_string()))?;

        let runtime = Runtime::new().map_err(BridgeError::Runtime)?;
        let ws_stream = runtime.block_on(connect_with_retry(url))?;
        info!(bridge_url = url, "connected");

        let (write_half, read_half) = ws_stream.split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<BridgeRequest>();
        let (inbound_tx, inbound_rx) = std::sync::mpsc::channel::<InboundMessage>();
        let pending: Pending = Arc::default();
        let closed = Arc::new(AtomicBool::new(false));

        runtime.spawn(network_send_task(write_half, outgoing_rx));
        runtime.spawn(network_receive_task(
            read_half,
            inbound_tx,
            pending.clone(),
            closed.clone(),
        ));

        let client = Self {
            runtime,
            outgoing: outgoing_tx,
            pending,
            closed,
            next_id: AtomicU64::new(1),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };
        Ok((client, inbound_rx))
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    fn request(
        &self,
        build: impl FnOnce(RequestId) -> BridgeRequest,
        wait: Duration,
    ) -> Result<BridgeEvent, MessagingError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = build(id);
        let name = request.name();
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            // `closed` flips under this lock, so a registered waiter is
            // either answered or dropped by the shutdown sweep.
            let Ok(mut pending) = self.pending.lock() else {
                return Err(MessagingError::Closed);
            };
            if self.closed.load(Ordering::Acquire) {
                return Err(MessagingError::Closed);
            }
            pending.insert(id, reply_tx);
        }

        debug!(id, request = name, "bridge request");
        if self.outgoing.send(request).is_err() {
            self.forget(id);
            return Err(MessagingError::Closed);
        }

        match self.runtime.block_on(timeout(wait, reply_rx)) {
            Ok(Ok(BridgeEvent::Error { message, .. })) => {
                warn!(id, request = name, "bridge rejected request: {}", message);
                Err(MessagingError::Rejected(message))
            }
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(MessagingError::Closed),
            Err(_) => {
                self.forget(id);
                warn!(id, request = name, "bridge request timed out after {:?}", wait);
                Err(MessagingError::Timeout)
            }
        }
    }

    fn forget(&self, id: RequestId) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }
}

impl MessagingClient for BridgeClient {
    fn search(&self, keyword: &str) -> Result<Vec<Conversation>, MessagingError> {
        let keyword = keyword.to_owned();
        match self.request(
            |id| BridgeRequest::Search { id, keyword },
            self.request_timeout,
        )? {
            BridgeEvent::Conversations { conversations, .. } => Ok(conversations),
            _ => Err(MessagingError::UnexpectedReply { request: "search" }),
        }
    }

    fn send(
        &self,
        conversation: &Conversation,
        payload: &OutboundPayload,
    ) -> Result<(), MessagingError> {
        // The bridge runs with its own working directory.
        let payload = match payload {
            OutboundPayload::Media { kind, path } => OutboundPayload::Media {
                kind: *kind,
                path: std::path::absolute(path)?,
            },
            OutboundPayload::Text { .. } => payload.clone(),
        };
        let conversation_id = conversation.id.clone();
        match self.request(
            |id| BridgeRequest::Send {
                id,
                conversation_id,
                payload,
            },
            self.request_timeout,
        )? {
            BridgeEvent::Ack { .. } => Ok(()),
            _ => Err(MessagingError::UnexpectedReply { request: "send" }),
        }
    }

    fn fetch_attachment(
        &self,
        message: &InboundMessage,
        dest: &Path,
    ) -> Result<(), MessagingError> {
        let message_id = message.id.clone();
        let data_b64 = match self.request(
            |id| BridgeRequest::FetchAttachment { id, message_id },
            ATTACHMENT_TIMEOUT.max(self.request_timeout),
        )? {
            BridgeEvent::Attachment { data_b64, .. } => data_b64,
            _ => {
                return Err(MessagingError::UnexpectedReply {
                    request: "fetch_attachment",
                });
            }
        };

        if decoded_len_estimate(&data_b64) > MAX_ATTACHMENT_BYTES + 2 {
            return Err(MessagingError::AttachmentTooLarge {
                max: MAX_ATTACHMENT_BYTES,
            });
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data_b64.as_bytes())
            .map_err(|err| MessagingError::InvalidAttachment(err.to_string()))?;
        if bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(MessagingError::AttachmentTooLarge {
                max: MAX_ATTACHMENT_BYTES,
            });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, &bytes)?;
        debug!(
            message_id = %message.id,
            size = bytes.len(),
            path = %dest.display(),
            "attachment saved"
        );
        Ok(())
    }
}

async fn connect_with_retry(url: &str) -> Result<WsStream, BridgeError> {
    let mut attempt: u32 = 1;
    loop {
        info!(
            attempt,
            max_attempts = MAX_CONNECT_ATTEMPTS,
            bridge_url = url,
            "connecting"
        );

        let msg = match timeout(CONNECT_TIMEOUT, connect_async(url)).await {
            Ok(Ok((ws_stream, _))) => return Ok(ws_stream),
            Ok(Err(err)) => format!("connect failed: {err}"),
            Err(_) => format!("connect timed out after {:?}", CONNECT_TIMEOUT),
        };
        error!(attempt, bridge_url = url, "{msg}");
        if attempt >= MAX_CONNECT_ATTEMPTS {
            return Err(BridgeError::Connect(msg));
        }

        let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        attempt += 1;
    }
}

async fn network_send_task(
    mut ws_write: futures::stream::SplitSink<WsStream, Message>,
    mut outgoing_rx: mpsc::UnboundedReceiver<BridgeRequest>,
) {
    while let Some(request) = outgoing_rx.recv().await {
        match encode_request(&request) {
            Ok(frame) => {
                if ws_write.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            Err(err) => warn!("failed to encode bridge request: {}", err),
        }
    }
}

async fn network_receive_task(
    mut ws_read: futures::stream::SplitStream<WsStream>,
    inbound_tx: std::sync::mpsc::Sender<InboundMessage>,
    pending: Pending,
    closed: Arc<AtomicBool>,
) {
    while let Some(next) = ws_read.next().await {
        let message = match next {
            Ok(msg) => msg,
            Err(err) => {
                warn!("bridge read failed: {}", err);
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let event = match decode_event(text.as_str()) {
            Ok(event) => event,
            Err(err) => {
                warn!("decode bridge event failed: {}", err);
                continue;
            }
        };

        if let Some(id) = event.request_id() {
            let waiter = pending.lock().ok().and_then(|mut pending| pending.remove(&id));
            match waiter {
                Some(reply_tx) => {
                    let _ = reply_tx.send(event);
                }
                None => debug!(id, "late bridge reply dropped"),
            }
            continue;
        }

        match event {
            BridgeEvent::Message { message } => {
                debug!(message_id = %message.id, "inbound message");
                if inbound_tx.send(message).is_err() {
                    break;
                }
            }
            BridgeEvent::Error { message, .. } => warn!("bridge error: {}", message),
            other => debug!(?other, "unsolicited bridge event ignored"),
        }
    }

    match pending.lock() {
        Ok(mut pending) => {
            closed.store(true, Ordering::Release);
            pending.clear();
        }
        Err(_) => closed.store(true, Ordering::Release),
    }
    info!("bridge connection closed");
}
