//! Error types for the media bridge.
//!
//! Errors fall into two groups:
//! - per-frame errors ([`BridgeError::MalformedFrame`], mid-stream
//!   [`BridgeError::UnsupportedFormat`]) which drop a single frame and let the
//!   session continue
//! - session errors ([`BridgeError::BackpressureExceeded`], socket failures,
//!   [`ConnectError`]) which tear the session down and are reported once to
//!   listeners through the `error` event
//!
//! Nothing is retried automatically. Reconnecting is left to the caller.

use thiserror::Error;

/// Errors raised while opening the realtime side of a session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// No API key was supplied with the credentials
    #[error("API key is required to connect to the realtime API")]
    MissingApiKey,

    /// The handshake request could not be built
    #[error("Invalid realtime request: {0}")]
    InvalidRequest(String),

    /// The WebSocket handshake failed
    #[error("Realtime handshake failed: {0}")]
    Handshake(String),

    /// The handshake did not complete in time
    #[error("Realtime handshake timed out after {0}ms")]
    Timeout(u64),

    /// `connect` was called on a session that is already past `Connecting`
    #[error("Session is already connected")]
    AlreadyConnected,
}

/// Errors that can occur while bridging a call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// A frame is missing a required field or is not valid JSON/base64
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// An audio format outside `g711_ulaw` / `pcm16` was requested
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// A writer queue filled up because the peer is not draining it
    #[error("Backpressure exceeded on {side} writer (capacity {capacity})")]
    BackpressureExceeded {
        /// Which socket the writer belongs to
        side: &'static str,
        /// Configured queue capacity
        capacity: usize,
    },

    /// Socket-level failure
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON encoding failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The realtime side is not (or no longer) connected
    #[error("Not connected")]
    NotConnected,

    /// A session state transition that the state machine does not allow
    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition {
        /// State the session was in
        from: &'static str,
        /// Requested state
        to: &'static str,
    },

    /// Opening the realtime connection failed
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

impl BridgeError {
    /// Whether this error terminates the session.
    ///
    /// Per-frame errors are isolated to the frame they occurred on.
    /// `UnsupportedFormat` is only fatal during negotiation; the session
    /// decides that case itself and this returns `false` for it.
    pub fn is_fatal(&self) -> bool {
        match self {
            BridgeError::MalformedFrame(_)
            | BridgeError::UnsupportedFormat(_)
            | BridgeError::Serialization(_)
            | BridgeError::NotConnected => false,
            BridgeError::BackpressureExceeded { .. }
            | BridgeError::WebSocket(_)
            | BridgeError::InvalidTransition { .. }
            | BridgeError::Connect(_) => true,
        }
    }

    /// Short machine-readable code used in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::MalformedFrame(_) => "malformed_frame",
            BridgeError::UnsupportedFormat(_) => "unsupported_format",
            BridgeError::BackpressureExceeded { .. } => "backpressure_exceeded",
            BridgeError::WebSocket(_) => "websocket_error",
            BridgeError::Serialization(_) => "serialization_error",
            BridgeError::NotConnected => "not_connected",
            BridgeError::InvalidTransition { .. } => "invalid_transition",
            BridgeError::Connect(_) => "connect_error",
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
