//! Opening the realtime side of a session.
//!
//! The bridge only depends on [`RealtimeConnector`], so a session can be
//! pointed at the OpenAI endpoint, a compatible proxy, or a test server.

use async_trait::async_trait;
use http::HeaderValue;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, info};

use super::config::RealtimeCredentials;
use crate::core::bridge::SocketPair;
use crate::errors::ConnectError;

/// Opens a realtime WebSocket and hands back both halves.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self, credentials: &RealtimeCredentials) -> Result<SocketPair, ConnectError>;
}

/// Connector for the OpenAI Realtime API (and wire-compatible endpoints).
#[derive(Debug, Clone, Default)]
pub struct OpenAIRealtimeConnector;

impl OpenAIRealtimeConnector {
    pub fn new() -> Self {
        Self
    }

    /// Build the handshake request with the auth and beta headers.
    pub fn build_request(
        credentials: &RealtimeCredentials,
    ) -> Result<http::Request<()>, ConnectError> {
        if credentials.api_key.trim().is_empty() {
            return Err(ConnectError::MissingApiKey);
        }

        let url = credentials.ws_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectError::InvalidRequest(e.to_string()))?;

        let auth = HeaderValue::from_str(&format!("Bearer {}", credentials.api_key))
            .map_err(|e| ConnectError::InvalidRequest(format!("invalid API key header: {e}")))?;
        let headers = request.headers_mut();
        headers.insert(http::header::AUTHORIZATION, auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        Ok(request)
    }
}

#[async_trait]
impl RealtimeConnector for OpenAIRealtimeConnector {
    async fn connect(&self, credentials: &RealtimeCredentials) -> Result<SocketPair, ConnectError> {
        let request = Self::build_request(credentials)?;
        debug!(uri = %request.uri(), "Opening realtime WebSocket");

        let (ws_stream, response) = connect_async(request)
            .await
            .map_err(|e| ConnectError::Handshake(e.to_string()))?;

        info!(
            model = %credentials.model,
            status = %response.status(),
            "Connected to realtime API"
        );
        Ok(SocketPair::from_tungstenite(ws_stream))
    }
}
