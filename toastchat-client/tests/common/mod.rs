use std::{net::SocketAddr, thread::JoinHandle};

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpListener, sync::oneshot};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use toastchat_core::{BridgeEvent, BridgeRequest};

pub struct FakeBridge {
    pub url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl FakeBridge {
    /// Accepts one client, pushes `greeting`, then answers every request
    /// with whatever `handler` returns.
    pub fn start(
        greeting: Vec<BridgeEvent>,
        handler: impl Fn(BridgeRequest) -> Vec<BridgeEvent> + Send + 'static,
    ) -> Self {
        let (addr_tx, addr_rx) = std::sync::mpsc::channel::<SocketAddr>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("build runtime");
            runtime.block_on(async move {
                let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
                addr_tx
                    .send(listener.local_addr().expect("local addr"))
                    .expect("report addr");

                let serve = async {
                    let (stream, _) = listener.accept().await.expect("accept");
                    let ws = accept_async(stream).await.expect("websocket handshake");
                    let (mut write, mut read) = ws.split();
                    for event in greeting {
                        write.send(frame(&event)).await.expect("push event");
                    }
                    while let Some(Ok(message)) = read.next().await {
                        let Message::Text(text) = message else {
                            continue;
                        };
                        let request: BridgeRequest =
                            serde_json::from_str(text.as_str()).expect("decode request");
                        for event in handler(request) {
                            write.send(frame(&event)).await.expect("send reply");
                        }
                    }
                };

                tokio::select! {
                    _ = serve => {}
                    _ = shutdown_rx => {}
                }
            });
        });

        let addr = addr_rx.recv().expect("bridge address");
        Self {
            url: format!("ws://{addr}/bridge"),
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    pub fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for FakeBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

fn frame(event: &BridgeEvent) -> Message {
    Message::Text(serde_json::to_string(event).expect("encode event").into())
}
