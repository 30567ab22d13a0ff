//! Protocol message translator.
//!
//! Converts frames from either socket into side-tagged [`ControlEvent`]s and
//! turns control events back into frames for the opposite socket. Only the
//! mappings below ever cross sides:
//!
//! | from | frame | becomes |
//! |---|---|---|
//! | telephony | `media` | realtime `input_audio_buffer.append` |
//! | telephony | `start` / `mark` / `stop` | `Start` / `Mark` / `Stop` (handled by the bridge) |
//! | realtime | `response.audio.delta` | telephony `media` + `mark` |
//! | bridge | `Clear` | telephony `clear` |
//! | bridge | `Truncate` | realtime `conversation.item.truncate` |
//! | bridge | `FormatNegotiated` | realtime `session.update` |
//!
//! Anything else becomes [`ControlEvent::Unmapped`], which is observable on
//! the event bus but never written to a socket.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::core::codec::{self, AudioFormat};
use crate::core::realtime::{AgentConfig, ApiError, ClientEvent, ServerEvent, parse_server_event};
use crate::core::telephony::{MediaFormat, OutboundFrame, TelephonyFrame, parse_frame};
use crate::errors::{BridgeError, BridgeResult};

/// Which socket a frame or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Telephony,
    Realtime,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Telephony => write!(f, "telephony"),
            Side::Realtime => write!(f, "realtime"),
        }
    }
}

/// A chunk of encoded audio in flight through the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioFrame {
    pub side: Side,
    pub format: AudioFormat,
    /// Base64 payload, already validated for `format`
    pub payload: String,
    /// Decoded length; playback offsets are summed in bytes
    pub byte_len: usize,
    pub duration_ms: u64,
    /// Gateway timestamp for telephony frames
    pub timestamp: Option<String>,
}

/// Typed, side-tagged protocol event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    /// Telephony stream started
    Start {
        stream_sid: String,
        call_sid: Option<String>,
        media_format: Option<MediaFormat>,
        custom_parameters: HashMap<String, String>,
    },
    /// Caller audio
    Media { frame: AudioFrame },
    /// Telephony echoed a playback mark
    Mark { name: String },
    /// Telephony stream ended
    Stop,
    /// AI audio; `mark` is the playback checkpoint that follows it
    AudioDelta {
        item_id: String,
        mark: String,
        frame: AudioFrame,
    },
    AudioDone { item_id: String },
    /// Realtime VAD detected the caller speaking
    SpeechStarted {
        item_id: Option<String>,
        audio_start_ms: u64,
    },
    ResponseDone { response: Value },
    /// The model finished producing arguments for a function call
    ToolCall {
        call_id: String,
        name: Option<String>,
        arguments: String,
    },
    TranscriptionCompleted { item_id: String, transcript: String },
    SessionUpdated,
    /// Error reported by the realtime API
    RealtimeError { error: ApiError },
    /// Audio format fixed for the session
    FormatNegotiated { format: AudioFormat },
    /// Discard buffered telephony audio
    Clear,
    /// Truncate an assistant item at the caller's playback position
    Truncate { item_id: String, audio_end_ms: u64 },
    /// No mapping; observation only
    Unmapped {
        side: Side,
        event_type: String,
        raw: Value,
    },
}

impl ControlEvent {
    /// Socket the event originated from or is destined for.
    pub fn side(&self) -> Side {
        match self {
            Self::Start { .. }
            | Self::Media { .. }
            | Self::Mark { .. }
            | Self::Stop
            | Self::Clear => Side::Telephony,
            Self::AudioDelta { .. }
            | Self::AudioDone { .. }
            | Self::SpeechStarted { .. }
            | Self::ResponseDone { .. }
            | Self::ToolCall { .. }
            | Self::TranscriptionCompleted { .. }
            | Self::SessionUpdated
            | Self::RealtimeError { .. }
            | Self::FormatNegotiated { .. }
            | Self::Truncate { .. } => Side::Realtime,
            Self::Unmapped { side, .. } => *side,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Start { .. } => "start",
            Self::Media { .. } => "media",
            Self::Mark { .. } => "mark",
            Self::Stop => "stop",
            Self::AudioDelta { .. } => "audio_delta",
            Self::AudioDone { .. } => "audio_done",
            Self::SpeechStarted { .. } => "speech_started",
            Self::ResponseDone { .. } => "response_done",
            Self::ToolCall { .. } => "tool_call",
            Self::TranscriptionCompleted { .. } => "transcription_completed",
            Self::SessionUpdated => "session_updated",
            Self::RealtimeError { .. } => "realtime_error",
            Self::FormatNegotiated { .. } => "format_negotiated",
            Self::Clear => "clear",
            Self::Truncate { .. } => "truncate",
            Self::Unmapped { event_type, .. } => event_type,
        }
    }
}

/// Per-session translator state.
#[derive(Debug)]
pub struct ProtocolTranslator {
    agent: AgentConfig,
    /// Provisional until `bind`, then fixed
    format: AudioFormat,
    bound: bool,
    stream_sid: Option<String>,
    /// call_id -> function name, learned from `response.output_item.added`
    function_names: HashMap<String, String>,
    mark_seq: u64,
}

impl ProtocolTranslator {
    /// `format` is the expected session format; AI audio that arrives before
    /// negotiation is validated against it.
    pub fn new(agent: AgentConfig, format: AudioFormat) -> Self {
        Self {
            agent,
            format,
            bound: false,
            stream_sid: None,
            function_names: HashMap::new(),
            mark_seq: 0,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Whether the telephony stream has started and the format is fixed.
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    /// Fix the session format and stream id. The format can only be set once.
    pub fn bind(&mut self, stream_sid: &str, format: AudioFormat) -> BridgeResult<()> {
        if self.bound && self.format != format {
            return Err(BridgeError::UnsupportedFormat(format!(
                "session already negotiated {}, refusing {format}",
                self.format
            )));
        }
        self.format = format;
        self.bound = true;
        self.stream_sid = Some(stream_sid.to_string());
        Ok(())
    }

    /// Translate an inbound telephony text frame.
    ///
    /// On success the raw JSON is returned alongside the event so callers can
    /// publish both.
    pub fn from_telephony(&mut self, text: &str) -> BridgeResult<(Value, ControlEvent)> {
        let (raw, frame) = parse_frame(text)?;
        let event = match frame {
            TelephonyFrame::Start { stream_sid, start } => ControlEvent::Start {
                stream_sid,
                call_sid: start.call_sid,
                media_format: start.media_format,
                custom_parameters: start.custom_parameters,
            },
            TelephonyFrame::Media { media, .. } => {
                if !self.bound {
                    return Err(BridgeError::MalformedFrame(
                        "media frame before start".to_string(),
                    ));
                }
                let format = self.format;
                let raw_audio = codec::decode(&media.payload, format)?;
                ControlEvent::Media {
                    frame: AudioFrame {
                        side: Side::Telephony,
                        format,
                        byte_len: raw_audio.len(),
                        duration_ms: codec::duration_ms(raw_audio.len(), format),
                        payload: media.payload,
                        timestamp: media.timestamp,
                    },
                }
            }
            TelephonyFrame::Mark { name, .. } => ControlEvent::Mark { name },
            TelephonyFrame::Stop { .. } => ControlEvent::Stop,
            other => ControlEvent::Unmapped {
                side: Side::Telephony,
                event_type: other.event_name().to_string(),
                raw: raw.clone(),
            },
        };
        Ok((raw, event))
    }

    /// Translate an inbound realtime text frame.
    pub fn from_realtime(&mut self, text: &str) -> BridgeResult<(Value, ControlEvent)> {
        let (raw, event) = parse_server_event(text)?;
        let Some(event) = event else {
            let event_type = raw
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let unmapped = ControlEvent::Unmapped {
                side: Side::Realtime,
                event_type,
                raw: raw.clone(),
            };
            return Ok((raw, unmapped));
        };

        let control = match event {
            ServerEvent::AudioDelta { item_id, delta, .. } => {
                let format = self.format;
                let raw_audio = codec::decode(&delta, format)?;
                let mark = format!("{item_id}:{}", self.mark_seq);
                self.mark_seq += 1;
                ControlEvent::AudioDelta {
                    frame: AudioFrame {
                        side: Side::Realtime,
                        format,
                        byte_len: raw_audio.len(),
                        duration_ms: codec::duration_ms(raw_audio.len(), format),
                        payload: delta,
                        timestamp: None,
                    },
                    item_id,
                    mark,
                }
            }
            ServerEvent::AudioDone { item_id, .. } => ControlEvent::AudioDone { item_id },
            ServerEvent::SpeechStarted {
                item_id,
                audio_start_ms,
            } => ControlEvent::SpeechStarted {
                item_id,
                audio_start_ms,
            },
            ServerEvent::ResponseDone { response } => ControlEvent::ResponseDone { response },
            ServerEvent::OutputItemAdded { item, .. } => {
                if item.item_type == "function_call" {
                    if let (Some(call_id), Some(name)) = (item.call_id, item.name) {
                        self.function_names.insert(call_id, name);
                    }
                }
                ControlEvent::Unmapped {
                    side: Side::Realtime,
                    event_type: "response.output_item.added".to_string(),
                    raw: raw.clone(),
                }
            }
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
                ..
            } => {
                let announced = self.function_names.remove(&call_id);
                let name = name.or(announced);
                ControlEvent::ToolCall {
                    call_id,
                    name,
                    arguments,
                }
            }
            ServerEvent::TranscriptionCompleted {
                item_id,
                transcript,
                ..
            } => ControlEvent::TranscriptionCompleted {
                item_id,
                transcript,
            },
            ServerEvent::SessionUpdated { .. } => ControlEvent::SessionUpdated,
            ServerEvent::Error { error } => ControlEvent::RealtimeError { error },
            ServerEvent::SessionCreated { .. } | ServerEvent::SpeechStopped { .. } => {
                ControlEvent::Unmapped {
                    side: Side::Realtime,
                    event_type: raw
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    raw: raw.clone(),
                }
            }
        };
        Ok((raw, control))
    }

    /// Frames to write to the telephony socket for `event`.
    ///
    /// Returns an empty list for events that never reach the telephony side.
    pub fn to_telephony(&self, event: &ControlEvent) -> BridgeResult<Vec<OutboundFrame>> {
        let frames = match event {
            ControlEvent::AudioDelta { frame, mark, .. } => {
                let stream_sid = self.require_stream_sid()?;
                vec![
                    OutboundFrame::media(stream_sid, frame.payload.clone()),
                    OutboundFrame::mark(stream_sid, mark.clone()),
                ]
            }
            ControlEvent::Clear => vec![OutboundFrame::clear(self.require_stream_sid()?)],
            _ => Vec::new(),
        };
        Ok(frames)
    }

    /// Client event to write to the realtime socket for `event`, if any.
    pub fn to_realtime(&self, event: &ControlEvent) -> Option<ClientEvent> {
        match event {
            ControlEvent::Media { frame } => Some(ClientEvent::audio_append(frame.payload.clone())),
            ControlEvent::FormatNegotiated { format } => Some(ClientEvent::SessionUpdate {
                session: self.agent.session_config(*format),
            }),
            ControlEvent::Truncate {
                item_id,
                audio_end_ms,
            } => Some(ClientEvent::truncate(
                item_id.clone(),
                u32::try_from(*audio_end_ms).unwrap_or(u32::MAX),
            )),
            _ => None,
        }
    }

    fn require_stream_sid(&self) -> BridgeResult<&str> {
        self.stream_sid.as_deref().ok_or(BridgeError::NotConnected)
    }
}
