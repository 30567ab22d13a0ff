//! Media-stream WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media-stream WebSocket router
///
/// # Endpoint
///
/// `GET /media-stream` - WebSocket upgrade used by the telephony provider's
/// `<Stream>` verb (Twilio Media Streams or SignalWire cXML).
///
/// # Protocol
///
/// The provider sends `connected`, `start`, `media`, `mark` and `stop`
/// frames as JSON text. The server answers with `media`, `mark` and `clear`
/// frames carrying the agent's audio.
///
/// ```json
/// {"event": "start", "streamSid": "MZ...", "start": {"callSid": "CA...", "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}}}
/// {"event": "media", "streamSid": "MZ...", "media": {"payload": "<base64>"}}
/// ```
///
/// The connection limit middleware is applied in `main.rs`.
pub fn create_media_stream_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media-stream", get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
