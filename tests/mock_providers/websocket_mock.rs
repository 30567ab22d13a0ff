//! WebSocket mock of the OpenAI Realtime API
//!
//! Accepts connections on an ephemeral port, records the handshake headers
//! and every client event, and lets the test push server events back.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::accept_hdr_async;

/// How long test helpers wait for traffic before giving up
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Handshake details captured for one connection
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub path_and_query: String,
    pub authorization: Option<String>,
    pub openai_beta: Option<String>,
}

/// Test-side handle to one accepted realtime connection
pub struct MockRealtimeConnection {
    pub handshake: Handshake,
    received: mpsc::UnboundedReceiver<Value>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl MockRealtimeConnection {
    /// Next client event written by the bridge.
    pub async fn next_event(&mut self) -> Option<Value> {
        tokio::time::timeout(RECV_TIMEOUT, self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next client event, asserting its `type`.
    pub async fn expect_event(&mut self, event_type: &str) -> Value {
        let event = self
            .next_event()
            .await
            .unwrap_or_else(|| panic!("expected {event_type}, got nothing"));
        assert_eq!(
            event["type"], event_type,
            "unexpected client event: {event}"
        );
        event
    }

    /// Skip `input_audio_buffer.append` events until something else arrives.
    pub async fn next_non_audio_event(&mut self) -> Option<Value> {
        loop {
            let event = self.next_event().await?;
            if event["type"] != "input_audio_buffer.append" {
                return Some(event);
            }
        }
    }

    /// Event already received, without waiting.
    pub fn try_event(&mut self) -> Option<Value> {
        self.received.try_recv().ok()
    }

    pub fn send(&self, text: impl Into<String>) {
        let text: String = text.into();
        let _ = self.outbound.send(Message::Text(text.into()));
    }

    /// Close the socket from the server side.
    pub fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
    }

    /// Wait until the bridge closes its side of the socket.
    pub async fn closed(&mut self) -> bool {
        tokio::time::timeout(RECV_TIMEOUT, async {
            while self.received.recv().await.is_some() {}
        })
        .await
        .is_ok()
    }
}

/// Mock realtime server listening on 127.0.0.1
pub struct MockRealtimeServer {
    pub url: String,
    connections: mpsc::UnboundedReceiver<MockRealtimeConnection>,
    task: tokio::task::JoinHandle<()>,
}

impl MockRealtimeServer {
    /// Start the server. When `greet` is set every connection first receives
    /// `session.created`, as the real API does.
    pub async fn start(greet: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock realtime server");
        let addr = listener.local_addr().expect("mock server address");
        let (conn_tx, connections) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn_tx = conn_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, conn_tx, greet).await {
                        eprintln!("Mock realtime connection error: {e}");
                    }
                });
            }
        });

        Self {
            url: format!("ws://{addr}/v1/realtime"),
            connections,
            task,
        }
    }

    /// Wait for the next accepted connection.
    pub async fn accept(&mut self) -> MockRealtimeConnection {
        tokio::time::timeout(RECV_TIMEOUT, self.connections.recv())
            .await
            .ok()
            .flatten()
            .expect("bridge never connected to the mock realtime server")
    }
}

impl Drop for MockRealtimeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    conn_tx: mpsc::UnboundedSender<MockRealtimeConnection>,
    greet: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let captured = Arc::new(parking_lot::Mutex::new(Handshake::default()));
    let capture = captured.clone();
    let ws_stream = accept_hdr_async(
        stream,
        move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let header = |name: &str| {
                req.headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            *capture.lock() = Handshake {
                path_and_query: req
                    .uri()
                    .path_and_query()
                    .map(|p| p.to_string())
                    .unwrap_or_default(),
                authorization: header("authorization"),
                openai_beta: header("openai-beta"),
            };
            Ok(resp)
        },
    )
    .await?;

    let (mut write, mut read) = ws_stream.split();
    let (received_tx, received) = mpsc::unbounded_channel();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    if greet {
        write
            .send(Message::Text(
                crate::fixtures::frames::session_created().into(),
            ))
            .await?;
    }

    let handshake = captured.lock().clone();
    let _ = conn_tx.send(MockRealtimeConnection {
        handshake,
        received,
        outbound,
    });

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                        let _ = received_tx.send(value);
                    }
                }
                Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            out = outbound_rx.recv() => match out {
                Some(msg) => {
                    let is_close = matches!(msg, Message::Close(_));
                    write.send(msg).await?;
                    if is_close {
                        break;
                    }
                }
                None => break,
            },
        }
    }
    Ok(())
}
