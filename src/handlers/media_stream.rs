//! Telephony media-stream WebSocket handler
//!
//! Each upgraded connection is one phone call. The handler wraps the socket
//! in a [`MediaStreamBridge`], attaches a logging listener, connects the
//! realtime side with the server's credentials and, when enabled, asks the
//! model to speak first. It then waits for the bridge to close.

use axum::{
    Extension,
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::core::bridge::{MediaStreamBridge, SocketPair};
use crate::core::events::{BridgeEvent, EventFilter, EventSubscription};
use crate::core::realtime::ClientEvent;
use crate::middleware::CallSlot;
use crate::state::AppState;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Media-stream WebSocket handler
///
/// The call slot reserved by the connection limit middleware, if any, is
/// held until the call ends.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    slot: Option<Extension<CallSlot>>,
) -> Response {
    debug!("Media stream WebSocket upgrade requested");
    let slot = slot.map(|Extension(slot)| slot);

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_stream(socket, state, slot))
}

async fn handle_media_stream(socket: WebSocket, state: Arc<AppState>, _slot: Option<CallSlot>) {
    let options = state.config.bridge_options(state.connector.clone());
    let bridge = MediaStreamBridge::new(SocketPair::from_axum(socket), options);
    let session_id = bridge.session_id().to_string();
    info!(session_id = %session_id, "Telephony client connected");

    let listener = tokio::spawn(log_bridge_events(
        session_id.clone(),
        bridge.subscribe(EventFilter::All),
    ));

    let credentials = state.config.credentials();
    match bridge.connect(&credentials).await {
        Ok(()) => {
            if state.config.greeting_enabled {
                // Best effort: the call goes on even if the greeting is dropped
                bridge.send_event(ClientEvent::response_create());
            }
            bridge.closed().await;
        }
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Failed to start media bridge");
        }
    }

    // Dropping the bridge drops the last publisher, which ends the listener
    drop(bridge);
    if let Err(e) = listener.await {
        warn!(session_id = %session_id, error = %e, "Event listener task failed");
    }
    info!(session_id = %session_id, "Telephony client disconnected");
}

/// Application-level observer: logs what the call is doing.
async fn log_bridge_events(session_id: String, mut events: EventSubscription) {
    while let Some(event) = events.recv().await {
        match event.as_ref() {
            BridgeEvent::Connected {
                stream_sid, format, ..
            } => {
                info!(session_id = %session_id, stream_sid = %stream_sid, format = %format, "Media bridge active");
            }
            BridgeEvent::ResponseDone { response } => {
                info!(
                    session_id = %session_id,
                    status = response.get("status").and_then(|s| s.as_str()).unwrap_or("unknown"),
                    "AI response completed"
                );
            }
            BridgeEvent::TranscriptionCompleted {
                item_id,
                transcript,
            } => {
                info!(session_id = %session_id, item_id = %item_id, transcript = %transcript, "User transcription completed");
            }
            BridgeEvent::ToolStart {
                call_id,
                name,
                arguments,
            } => {
                info!(
                    session_id = %session_id,
                    call_id = %call_id,
                    name = name.as_deref().unwrap_or("unknown"),
                    arguments = %arguments,
                    "Tool call started"
                );
            }
            BridgeEvent::ToolEnd { call_id, .. } => {
                info!(session_id = %session_id, call_id = %call_id, "Tool call completed");
            }
            BridgeEvent::Interrupted {
                item_id,
                audio_end_ms,
            } => {
                info!(session_id = %session_id, item_id = %item_id, audio_end_ms, "Caller interrupted the agent");
            }
            BridgeEvent::Error {
                code,
                message,
                fatal: true,
                ..
            } => {
                error!(session_id = %session_id, code = %code, "Session error: {message}");
            }
            BridgeEvent::Error { code, message, .. } => {
                warn!(session_id = %session_id, code = %code, "Session warning: {message}");
            }
            BridgeEvent::Disconnected { reason, .. } => {
                info!(session_id = %session_id, reason = %reason, "Media bridge closed");
            }
            other => {
                trace!(session_id = %session_id, kind = ?other.kind(), "Bridge event");
            }
        }
    }
}
