pub mod bridge;
pub mod codec;
pub mod events;
pub mod interruption;
pub mod realtime;
pub mod telephony;
pub mod translator;

// Re-export commonly used types for convenience
pub use bridge::{
    AudioFormatPolicy, BridgeOptions, MediaStreamBridge, SessionState, SocketPair, WireMessage,
};
pub use codec::AudioFormat;
pub use events::{BridgeEvent, BridgeEventKind, EventBus, EventFilter, EventSubscription};
pub use interruption::{Interruption, InterruptionController, InterruptionMark};
pub use realtime::{
    AgentConfig, ClientEvent, OpenAIRealtimeConnector, RealtimeConnector, RealtimeCredentials,
    ServerEvent,
};
pub use telephony::{OutboundFrame, TelephonyFrame};
pub use translator::{AudioFrame, ControlEvent, ProtocolTranslator, Side};
