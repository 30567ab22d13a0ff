//! Telephony media-stream protocol (Twilio / SignalWire compatible).

pub mod messages;

pub use messages::{
    MediaChunk, MediaFormat, OutboundFrame, StartMetadata, TelephonyFrame, frame_event_name,
    parse_frame, parse_frame_value,
};
