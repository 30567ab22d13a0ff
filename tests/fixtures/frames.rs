//! Wire frame fixtures for both sides of the bridge.

use serde_json::{Value, json};

pub const STREAM_SID: &str = "MZ00000000000000000000000000000001";
pub const CALL_SID: &str = "CA00000000000000000000000000000001";

// =============================================================================
// Telephony (media stream) frames
// =============================================================================

pub fn connected() -> String {
    json!({"event": "connected", "protocol": "Call", "version": "1.0.0"}).to_string()
}

/// `start` frame announcing μ-law at 8 kHz.
pub fn start_ulaw() -> String {
    start_with_format("audio/x-mulaw", 8000)
}

pub fn start_with_format(encoding: &str, sample_rate: u32) -> String {
    json!({
        "event": "start",
        "sequenceNumber": "1",
        "streamSid": STREAM_SID,
        "start": {
            "streamSid": STREAM_SID,
            "accountSid": "AC00000000000000000000000000000001",
            "callSid": CALL_SID,
            "tracks": ["inbound"],
            "mediaFormat": {
                "encoding": encoding,
                "sampleRate": sample_rate,
                "channels": 1
            },
            "customParameters": {"caller": "+15550100"}
        }
    })
    .to_string()
}

pub fn media(payload_b64: &str, chunk: u64) -> String {
    json!({
        "event": "media",
        "sequenceNumber": (chunk + 1).to_string(),
        "streamSid": STREAM_SID,
        "media": {
            "track": "inbound",
            "chunk": chunk.to_string(),
            "timestamp": (chunk * 20).to_string(),
            "payload": payload_b64
        }
    })
    .to_string()
}

/// Playback acknowledgement echoed by the gateway.
pub fn mark(name: &str) -> String {
    json!({"event": "mark", "streamSid": STREAM_SID, "mark": {"name": name}}).to_string()
}

pub fn dtmf(digit: &str) -> String {
    json!({"event": "dtmf", "streamSid": STREAM_SID, "dtmf": {"track": "inbound_track", "digit": digit}})
        .to_string()
}

pub fn stop() -> String {
    json!({
        "event": "stop",
        "streamSid": STREAM_SID,
        "stop": {"accountSid": "AC00000000000000000000000000000001", "callSid": CALL_SID}
    })
    .to_string()
}

// =============================================================================
// Realtime server events
// =============================================================================

pub fn session_created() -> String {
    json!({
        "type": "session.created",
        "event_id": "evt_created",
        "session": {"id": "sess_1", "model": "gpt-4o-realtime-preview"}
    })
    .to_string()
}

pub fn audio_delta(item_id: &str, delta_b64: &str) -> String {
    json!({
        "type": "response.audio.delta",
        "event_id": "evt_delta",
        "response_id": "resp_1",
        "item_id": item_id,
        "output_index": 0,
        "content_index": 0,
        "delta": delta_b64
    })
    .to_string()
}

pub fn speech_started(audio_start_ms: u64) -> String {
    json!({
        "type": "input_audio_buffer.speech_started",
        "event_id": "evt_speech",
        "audio_start_ms": audio_start_ms,
        "item_id": "item_user_1"
    })
    .to_string()
}

pub fn response_done() -> String {
    json!({
        "type": "response.done",
        "event_id": "evt_done",
        "response": {"id": "resp_1", "status": "completed", "output": []}
    })
    .to_string()
}

pub fn function_call_done(call_id: &str, name: &str, arguments: &str) -> String {
    json!({
        "type": "response.function_call_arguments.done",
        "event_id": "evt_fn",
        "response_id": "resp_1",
        "item_id": "item_fn_1",
        "output_index": 0,
        "call_id": call_id,
        "name": name,
        "arguments": arguments
    })
    .to_string()
}

pub fn transcription_completed(item_id: &str, transcript: &str) -> String {
    json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "event_id": "evt_tr",
        "item_id": item_id,
        "content_index": 0,
        "transcript": transcript
    })
    .to_string()
}

pub fn realtime_error(code: &str, message: &str) -> String {
    json!({
        "type": "error",
        "event_id": "evt_err",
        "error": {"type": "invalid_request_error", "code": code, "message": message}
    })
    .to_string()
}

/// Parse a frame written by the bridge.
pub fn parse(text: &str) -> Value {
    serde_json::from_str(text).expect("bridge wrote invalid JSON")
}
