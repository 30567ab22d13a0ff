//! Concurrent call limit for the media-stream WebSocket
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use waav_media_bridge::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/media-stream", get(media_stream_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::state::{AppState, CallPermit, ConnectionLimitError};

/// Call slot carried from the middleware to the handler.
///
/// The handler moves it into the upgraded socket task so the slot stays
/// reserved until the call ends.
#[derive(Clone, Debug)]
pub struct CallSlot(pub Arc<CallPermit>);

/// Middleware that enforces `max_concurrent_calls`.
///
/// Only WebSocket upgrade requests (detected by the `Upgrade` header) are
/// counted; anything else passes through. Returns 503 Service Unavailable
/// when the limit is reached.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    match state.try_acquire_call() {
        Ok(permit) => {
            request.extensions_mut().insert(CallSlot(Arc::new(permit)));
            next.run(request).await
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            tracing::warn!(
                active_calls = state.active_call_count(),
                "Rejecting call: concurrent call limit reached"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
    }
}
