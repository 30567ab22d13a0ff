//! Realtime API side of the bridge.
//!
//! - [`messages`]: client and server event types
//! - [`config`]: endpoint, credentials and agent configuration
//! - [`connector`]: the [`RealtimeConnector`] seam used to open the socket

pub mod config;
pub mod connector;
pub mod messages;

pub use config::{
    AgentConfig, DEFAULT_REALTIME_MODEL, DEFAULT_VOICE, OPENAI_REALTIME_URL, RealtimeCredentials,
};
pub use connector::{OpenAIRealtimeConnector, RealtimeConnector};
pub use messages::{
    ApiError, ClientEvent, ConversationItem, ResponseConfig, ServerEvent, SessionConfig, ToolDef,
    TurnDetection, parse_server_event,
};
