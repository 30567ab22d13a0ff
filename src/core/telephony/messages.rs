//! Media-stream frames exchanged with the telephony gateway.
//!
//! Twilio and SignalWire share the same framing: every frame is a JSON object
//! whose `event` field names the frame type. Some gateways use `type` instead,
//! so both are accepted on inbound frames. Outbound frames are always written
//! with `event`.
//!
//! Inbound (gateway to bridge):
//! - connected - socket is up, no call metadata yet
//! - start - call metadata including `streamSid` and `mediaFormat`
//! - media - base64 audio in `media.payload`
//! - mark - echo of a mark previously sent by the bridge, sent once the
//!   audio queued before it has been played
//! - dtmf - keypad digit
//! - stop - stream ended
//!
//! Outbound (bridge to gateway):
//! - media - audio to play
//! - mark - playback checkpoint
//! - clear - discard all buffered audio

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::{BridgeError, BridgeResult};

// =============================================================================
// Inbound Frames
// =============================================================================

/// `mediaFormat` block of a `start` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

fn default_channels() -> u16 {
    1
}

/// Call metadata carried by a `start` frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartMetadata {
    pub stream_sid: Option<String>,
    pub account_sid: Option<String>,
    pub call_sid: Option<String>,
    pub tracks: Vec<String>,
    pub media_format: Option<MediaFormat>,
    pub custom_parameters: HashMap<String, String>,
}

/// Audio chunk carried by a `media` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaChunk {
    /// Base64 audio
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub chunk: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub timestamp: Option<String>,
}

/// Twilio sends numeric fields as strings, other gateways as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A parsed inbound frame from the telephony gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyFrame {
    Connected {
        protocol: Option<String>,
    },
    Start {
        stream_sid: String,
        start: StartMetadata,
    },
    Media {
        stream_sid: Option<String>,
        media: MediaChunk,
    },
    Mark {
        stream_sid: Option<String>,
        name: String,
    },
    Dtmf {
        stream_sid: Option<String>,
        digit: String,
    },
    Stop {
        stream_sid: Option<String>,
    },
    /// A frame type with no translation; only observed on the wildcard channel
    Unknown {
        event: String,
    },
}

impl TelephonyFrame {
    /// Frame type name as it appears on the wire.
    pub fn event_name(&self) -> &str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Start { .. } => "start",
            Self::Media { .. } => "media",
            Self::Mark { .. } => "mark",
            Self::Dtmf { .. } => "dtmf",
            Self::Stop { .. } => "stop",
            Self::Unknown { event } => event,
        }
    }
}

/// Read the frame discriminator, preferring `event` over `type`.
pub fn frame_event_name(value: &Value) -> Option<&str> {
    value
        .get("event")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn required<T>(value: Option<T>, what: &str) -> BridgeResult<T> {
    value.ok_or_else(|| BridgeError::MalformedFrame(format!("missing {what}")))
}

fn sub_object<T: for<'de> Deserialize<'de>>(value: &Value, key: &str) -> BridgeResult<T> {
    let inner = required(value.get(key), key)?;
    serde_json::from_value(inner.clone())
        .map_err(|e| BridgeError::MalformedFrame(format!("invalid {key} block: {e}")))
}

/// Parse an already-decoded JSON frame.
pub fn parse_frame_value(value: &Value) -> BridgeResult<TelephonyFrame> {
    let event = required(frame_event_name(value), "event")?;
    let stream_sid = str_field(value, "streamSid");

    let frame = match event {
        "connected" => TelephonyFrame::Connected {
            protocol: str_field(value, "protocol"),
        },
        "start" => {
            let start: StartMetadata = sub_object(value, "start")?;
            let stream_sid = required(
                stream_sid.or_else(|| start.stream_sid.clone()),
                "streamSid",
            )?;
            TelephonyFrame::Start { stream_sid, start }
        }
        "media" => {
            let media = value
                .get("media")
                .filter(|m| m.get("payload").is_some())
                .ok_or_else(|| BridgeError::MalformedFrame("missing media.payload".into()))?;
            let media: MediaChunk = serde_json::from_value(media.clone())
                .map_err(|e| BridgeError::MalformedFrame(format!("invalid media block: {e}")))?;
            TelephonyFrame::Media { stream_sid, media }
        }
        "mark" => {
            let name = value
                .get("mark")
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str);
            TelephonyFrame::Mark {
                stream_sid,
                name: required(name, "mark.name")?.to_string(),
            }
        }
        "dtmf" => {
            let digit = value
                .get("dtmf")
                .and_then(|d| d.get("digit"))
                .and_then(Value::as_str);
            TelephonyFrame::Dtmf {
                stream_sid,
                digit: required(digit, "dtmf.digit")?.to_string(),
            }
        }
        "stop" => TelephonyFrame::Stop { stream_sid },
        other => TelephonyFrame::Unknown {
            event: other.to_string(),
        },
    };
    Ok(frame)
}

/// Parse a text frame received from the gateway.
pub fn parse_frame(text: &str) -> BridgeResult<(Value, TelephonyFrame)> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| BridgeError::MalformedFrame(format!("invalid JSON: {e}")))?;
    let frame = parse_frame_value(&value)?;
    Ok((value, frame))
}

// =============================================================================
// Outbound Frames
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMark {
    pub name: String,
}

/// Frames the bridge writes to the telephony gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundFrame {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: OutboundMark,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

impl OutboundFrame {
    pub fn media(stream_sid: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::Media {
            stream_sid: stream_sid.into(),
            media: OutboundMedia {
                payload: payload.into(),
            },
        }
    }

    pub fn mark(stream_sid: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Mark {
            stream_sid: stream_sid.into(),
            mark: OutboundMark { name: name.into() },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        Self::Clear {
            stream_sid: stream_sid.into(),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Media { .. } => "media",
            Self::Mark { .. } => "mark",
            Self::Clear { .. } => "clear",
        }
    }

    pub fn to_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
