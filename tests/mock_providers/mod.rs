//! Mock Provider Servers
//!
//! In-process stand-ins for the remote services the bridge talks to.

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod websocket_mock;

pub use websocket_mock::{Handshake, MockRealtimeConnection, MockRealtimeServer, RECV_TIMEOUT};
