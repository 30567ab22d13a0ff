//! Realtime API connection and agent configuration.
//!
//! - Endpoint and default model
//! - Credentials used for the WebSocket handshake
//! - Agent behaviour copied into every `session.update`

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::messages::{InputAudioTranscription, SessionConfig, ToolDef, TurnDetection};
use crate::core::codec::AudioFormat;
use crate::errors::ConnectError;

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Model used when none is configured.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview";

/// Voice used when none is configured.
pub const DEFAULT_VOICE: &str = "alloy";

// =============================================================================
// Credentials
// =============================================================================

/// Credentials and target for one realtime connection.
///
/// The key is wiped from memory when the value is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RealtimeCredentials {
    pub api_key: String,
    pub model: String,
    pub url: String,
}

impl RealtimeCredentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
            url: OPENAI_REALTIME_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Handshake URL: `{url}?model={model}`.
    pub fn ws_url(&self) -> Result<Url, ConnectError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| ConnectError::InvalidRequest(format!("invalid realtime URL: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConnectError::InvalidRequest(format!(
                "realtime URL must use ws or wss, got {}",
                url.scheme()
            )));
        }
        url.query_pairs_mut().append_pair("model", &self.model);
        Ok(url)
    }
}

impl fmt::Debug for RealtimeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeCredentials")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("url", &self.url)
            .finish()
    }
}

// =============================================================================
// Agent Configuration
// =============================================================================

/// Agent behaviour sent to the realtime API.
///
/// The bridge does not interpret any of this; it is merged with the
/// negotiated audio format into the single `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub instructions: Option<String>,
    pub voice: String,
    pub temperature: Option<f32>,
    /// Input transcription model; transcription is disabled when unset
    pub transcription_model: Option<String>,
    pub turn_detection: Option<TurnDetection>,
    pub tools: Vec<ToolDef>,
    pub tool_choice: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instructions: None,
            voice: DEFAULT_VOICE.to_string(),
            temperature: None,
            transcription_model: None,
            turn_detection: Some(TurnDetection::server_vad()),
            tools: Vec::new(),
            tool_choice: None,
        }
    }
}

impl AgentConfig {
    /// Build the `session.update` payload for a negotiated format.
    pub fn session_config(&self, format: AudioFormat) -> SessionConfig {
        SessionConfig {
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            instructions: self.instructions.clone(),
            voice: Some(self.voice.clone()),
            input_audio_format: Some(format.as_str().to_string()),
            output_audio_format: Some(format.as_str().to_string()),
            input_audio_transcription: self
                .transcription_model
                .as_ref()
                .map(|model| InputAudioTranscription {
                    model: model.clone(),
                }),
            turn_detection: self.turn_detection.clone(),
            tools: (!self.tools.is_empty()).then(|| self.tools.clone()),
            tool_choice: self.tool_choice.clone(),
            temperature: self.temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url() {
        let creds = RealtimeCredentials::new("sk-test");
        assert_eq!(
            creds.ws_url().unwrap().as_str(),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview"
        );

        let creds = RealtimeCredentials::new("sk-test")
            .with_url("ws://127.0.0.1:9000/v1/realtime")
            .with_model("gpt-realtime");
        assert_eq!(
            creds.ws_url().unwrap().as_str(),
            "ws://127.0.0.1:9000/v1/realtime?model=gpt-realtime"
        );
    }

    #[test]
    fn test_ws_url_rejects_http() {
        let creds = RealtimeCredentials::new("k").with_url("https://api.openai.com/v1/realtime");
        assert!(matches!(
            creds.ws_url(),
            Err(ConnectError::InvalidRequest(_))
        ));
        let creds = RealtimeCredentials::new("k").with_url("not a url");
        assert!(creds.ws_url().is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_key() {
        let creds = RealtimeCredentials::new("sk-secret");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_session_config_uses_negotiated_format() {
        let agent = AgentConfig {
            instructions: Some("Be brief".to_string()),
            transcription_model: Some("whisper-1".to_string()),
            ..Default::default()
        };
        let session = agent.session_config(AudioFormat::G711Ulaw);
        assert_eq!(session.input_audio_format.as_deref(), Some("g711_ulaw"));
        assert_eq!(session.output_audio_format.as_deref(), Some("g711_ulaw"));
        assert_eq!(session.voice.as_deref(), Some("alloy"));
        assert_eq!(
            session.input_audio_transcription.unwrap().model,
            "whisper-1"
        );
        assert!(session.tools.is_none());

        let session = AgentConfig::default().session_config(AudioFormat::Pcm16);
        assert_eq!(session.input_audio_format.as_deref(), Some("pcm16"));
        assert!(session.input_audio_transcription.is_none());
    }

    #[test]
    fn test_agent_config_yaml_defaults() {
        let agent: AgentConfig = serde_json::from_str(r#"{"voice": "verse"}"#).unwrap();
        assert_eq!(agent.voice, "verse");
        assert!(agent.turn_detection.is_some());
    }
}
