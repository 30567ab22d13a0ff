pub mod api;
pub mod media_stream;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

/// Combine the public and media-stream routes.
///
/// Layer order for `/media-stream`: connection_limit -> handler. Transport
/// concerns (CORS, rate limiting, security headers) are added in `main.rs`.
pub fn create_app(state: Arc<AppState>) -> Router {
    let media_routes = media_stream::create_media_stream_router().layer(
        middleware::from_fn_with_state(state.clone(), connection_limit_middleware),
    );

    api::create_api_router()
        .merge(media_routes)
        .with_state(state)
}
