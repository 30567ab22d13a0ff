//! Connection bridge.
//!
//! Owns both sockets of a call, runs the read/translate/write loop for each
//! direction and drives the session state machine.

mod media_bridge;
pub mod policy;
mod session;
pub mod state;
pub mod transport;

pub use media_bridge::MediaStreamBridge;
pub use policy::{
    AudioFormatPolicy, BridgeOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_PENDING_FRAMES,
    DEFAULT_READ_TIMEOUT,
};
pub use state::SessionState;
pub use transport::{MemoryPeer, SocketPair, WireMessage, WireSink, WireStream};
