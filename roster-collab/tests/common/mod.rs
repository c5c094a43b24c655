//! Scripted collaboration server for integration tests.
//!
//! Accepts WebSocket connections on a free local port, records every text
//! frame it receives and lets the test push frames or close all sockets.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use roster_collab::WireMessage;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Duration, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
pub enum ServerCommand {
    Text(String),
    Close,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

pub struct TestServer {
    pub url: String,
    counters: Arc<Counters>,
    received: Arc<Mutex<Vec<String>>>,
    commands: broadcast::Sender<ServerCommand>,
}

impl TestServer {
    /// Bind a free port and start accepting.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let counters = Arc::new(Counters::default());
        let received = Arc::new(Mutex::new(Vec::new()));
        let (commands, _) = broadcast::channel(64);

        let server = Self {
            url: format!("ws://127.0.0.1:{port}"),
            counters: counters.clone(),
            received: received.clone(),
            commands: commands.clone(),
        };

        tokio::spawn(async move {
            while let Ok((stream, _addr)) = listener.accept().await {
                let counters = counters.clone();
                let received = received.clone();
                let commands = commands.subscribe();
                tokio::spawn(async move {
                    let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    counters.accepted.fetch_add(1, Ordering::SeqCst);
                    let now = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
                    counters.max_active.fetch_max(now, Ordering::SeqCst);

                    serve(ws_stream, received, commands).await;

                    counters.active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        server
    }

    /// Push a raw text frame to every connected client.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.commands.send(ServerCommand::Text(text.into()));
    }

    pub fn push(&self, message: &WireMessage) {
        self.push_text(message.encode().unwrap());
    }

    /// Close every connected socket from the server side.
    pub fn close_all(&self) {
        let _ = self.commands.send(ServerCommand::Close);
    }

    pub fn accepted(&self) -> usize {
        self.counters.accepted.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.counters.max_active.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Decoded frames of the given `type`.
    pub fn received_of(&self, kind: &str) -> Vec<WireMessage> {
        self.received()
            .iter()
            .filter_map(|text| WireMessage::decode(text).ok())
            .filter(|message| message.kind() == kind)
            .collect()
    }
}

async fn serve(
    ws_stream: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    received: Arc<Mutex<Vec<String>>>,
    mut commands: broadcast::Receiver<ServerCommand>,
) {
    let (mut writer, mut reader) = ws_stream.split();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(ServerCommand::Text(text)) => {
                    if writer.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(ServerCommand::Close) | Err(_) => {
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: "server restart".into(),
                    };
                    let _ = writer.send(Message::Close(Some(frame))).await;
                    break;
                }
            },
            incoming = reader.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    received.lock().unwrap().push(text.as_str().to_owned());
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Next event, failing the test after two seconds.
pub async fn next_event<T>(events: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}
