//! Socket abstraction shared by both sides of the bridge.
//!
//! The bridge never touches axum or tungstenite types directly. Each socket is
//! reduced to a boxed stream of inbound [`WireMessage`]s and a boxed sink of
//! outbound ones, which also lets tests drive a session over in-memory
//! channels.

use std::pin::Pin;

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::future::ready;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

use crate::errors::{BridgeError, BridgeResult};

/// A WebSocket message independent of the underlying library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    /// Close with an optional reason
    Close(Option<String>),
}

impl WireMessage {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WireMessage::Text(text) => Some(text),
            _ => None,
        }
    }
}

pub type WireStream = Pin<Box<dyn Stream<Item = BridgeResult<WireMessage>> + Send>>;
pub type WireSink = Pin<Box<dyn Sink<WireMessage, Error = BridgeError> + Send>>;

/// Read and write halves of one WebSocket.
pub struct SocketPair {
    pub stream: WireStream,
    pub sink: WireSink,
}

impl std::fmt::Debug for SocketPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketPair").finish_non_exhaustive()
    }
}

impl SocketPair {
    pub fn from_parts<St, Si>(stream: St, sink: Si) -> Self
    where
        St: Stream<Item = BridgeResult<WireMessage>> + Send + 'static,
        Si: Sink<WireMessage, Error = BridgeError> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
            sink: Box::pin(sink),
        }
    }

    /// Wrap a server-side socket accepted by axum.
    pub fn from_axum(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        let stream = stream.map(|msg| {
            msg.map(from_axum_message)
                .map_err(|e| BridgeError::WebSocket(e.to_string()))
        });
        let sink = sink
            .sink_map_err(|e| BridgeError::WebSocket(e.to_string()))
            .with(|msg: WireMessage| ready(Ok::<_, BridgeError>(to_axum_message(msg))));
        Self::from_parts(stream, sink)
    }

    /// Wrap a socket established with tokio-tungstenite.
    pub fn from_tungstenite<S>(ws: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        let stream = stream.filter_map(|msg| {
            ready(match msg {
                Ok(msg) => from_tungstenite_message(msg).map(Ok),
                Err(e) => Some(Err(BridgeError::WebSocket(e.to_string()))),
            })
        });
        let sink = sink
            .sink_map_err(|e| BridgeError::WebSocket(e.to_string()))
            .with(|msg: WireMessage| ready(Ok::<_, BridgeError>(to_tungstenite_message(msg))));
        Self::from_parts(stream, sink)
    }

    /// In-memory socket. The returned [`MemoryPeer`] plays the remote end.
    pub fn memory() -> (Self, MemoryPeer) {
        let (to_bridge, from_peer) = mpsc::unbounded::<WireMessage>();
        let (to_peer, from_bridge) = mpsc::unbounded::<WireMessage>();
        let pair = Self::from_parts(
            from_peer.map(Ok),
            to_peer.sink_map_err(|e| BridgeError::WebSocket(e.to_string())),
        );
        let peer = MemoryPeer {
            tx: Some(to_bridge),
            rx: from_bridge,
        };
        (pair, peer)
    }
}

/// Remote end of an in-memory [`SocketPair`].
pub struct MemoryPeer {
    tx: Option<mpsc::UnboundedSender<WireMessage>>,
    rx: mpsc::UnboundedReceiver<WireMessage>,
}

impl MemoryPeer {
    /// Deliver a message to the bridge. Returns false once the bridge is gone
    /// or the peer has hung up.
    pub fn send(&self, msg: WireMessage) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.unbounded_send(msg).is_ok())
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(WireMessage::Text(text.into()))
    }

    /// Next message written by the bridge, `None` once the bridge closed its sink.
    pub async fn recv(&mut self) -> Option<WireMessage> {
        self.rx.next().await
    }

    /// Message already written by the bridge, without waiting.
    pub fn try_recv(&mut self) -> Option<WireMessage> {
        self.rx.try_next().ok().flatten()
    }

    /// End the inbound stream, as if the remote side dropped the connection.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }
}

fn from_axum_message(msg: AxumMessage) -> WireMessage {
    match msg {
        AxumMessage::Text(text) => WireMessage::Text(text.as_str().to_string()),
        AxumMessage::Binary(data) => WireMessage::Binary(data),
        AxumMessage::Ping(data) => WireMessage::Ping(data),
        AxumMessage::Pong(data) => WireMessage::Pong(data),
        AxumMessage::Close(frame) => WireMessage::Close(frame.map(|f| f.reason.as_str().to_string())),
    }
}

fn to_axum_message(msg: WireMessage) -> AxumMessage {
    match msg {
        WireMessage::Text(text) => AxumMessage::Text(text.into()),
        WireMessage::Binary(data) => AxumMessage::Binary(data),
        WireMessage::Ping(data) => AxumMessage::Ping(data),
        WireMessage::Pong(data) => AxumMessage::Pong(data),
        WireMessage::Close(_) => AxumMessage::Close(None),
    }
}

fn from_tungstenite_message(msg: TungsteniteMessage) -> Option<WireMessage> {
    match msg {
        TungsteniteMessage::Text(text) => Some(WireMessage::Text(text.as_str().to_string())),
        TungsteniteMessage::Binary(data) => Some(WireMessage::Binary(data)),
        TungsteniteMessage::Ping(data) => Some(WireMessage::Ping(data)),
        TungsteniteMessage::Pong(data) => Some(WireMessage::Pong(data)),
        TungsteniteMessage::Close(frame) => Some(WireMessage::Close(
            frame.map(|f| f.reason.as_str().to_string()),
        )),
        // Raw frames only surface when reading with a custom config
        TungsteniteMessage::Frame(_) => None,
    }
}

fn to_tungstenite_message(msg: WireMessage) -> TungsteniteMessage {
    match msg {
        WireMessage::Text(text) => TungsteniteMessage::Text(text.into()),
        WireMessage::Binary(data) => TungsteniteMessage::Binary(data),
        WireMessage::Ping(data) => TungsteniteMessage::Ping(data),
        WireMessage::Pong(data) => TungsteniteMessage::Pong(data),
        WireMessage::Close(_) => TungsteniteMessage::Close(None),
    }
}
