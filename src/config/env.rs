use std::env;
use std::path::PathBuf;

use super::utils::{parse_audio_format, parse_bool, parse_number};
use super::{ServerConfig, TlsConfig, validation};
use crate::core::bridge::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_PENDING_FRAMES, DEFAULT_READ_TIMEOUT};
use crate::core::realtime::{AgentConfig, DEFAULT_REALTIME_MODEL, DEFAULT_VOICE, OPENAI_REALTIME_URL};

pub(super) const DEFAULT_HOST: &str = "0.0.0.0";
pub(super) const DEFAULT_PORT: u16 = 5050;
pub(super) const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
pub(super) const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// `.env` is loaded by `main` before this runs, so both sources are
    /// visible here. Unset variables fall back to defaults.
    ///
    /// # Errors
    /// Returns an error if a numeric or boolean variable cannot be parsed,
    /// if `AUDIO_FORMAT` names an unsupported format, or if only one of the
    /// TLS paths is set.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let host = var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_number("PORT", var("PORT"))?.unwrap_or(DEFAULT_PORT);

        let tls = match (var("TLS_CERT_PATH"), var("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => {
                return Err(
                    "TLS_CERT_PATH and TLS_KEY_PATH must be set together to enable TLS".into(),
                );
            }
        };

        let audio_format = var("AUDIO_FORMAT")
            .map(|value| parse_audio_format(&value))
            .transpose()?;

        let agent = AgentConfig {
            instructions: var("AGENT_INSTRUCTIONS"),
            voice: var("AGENT_VOICE").unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            temperature: parse_number("AGENT_TEMPERATURE", var("AGENT_TEMPERATURE"))?,
            transcription_model: var("TRANSCRIPTION_MODEL"),
            ..AgentConfig::default()
        };

        let config = ServerConfig {
            host,
            port,
            tls,
            openai_api_key: var("OPENAI_API_KEY"),
            realtime_url: var("OPENAI_REALTIME_URL")
                .unwrap_or_else(|| OPENAI_REALTIME_URL.to_string()),
            realtime_model: var("OPENAI_REALTIME_MODEL")
                .unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string()),
            audio_format,
            agent,
            greeting_enabled: parse_bool("GREETING_ENABLED", var("GREETING_ENABLED"))?
                .unwrap_or(true),
            max_pending_frames: parse_number(
                "BRIDGE_MAX_PENDING_FRAMES",
                var("BRIDGE_MAX_PENDING_FRAMES"),
            )?
            .unwrap_or(DEFAULT_MAX_PENDING_FRAMES),
            read_timeout_seconds: parse_number(
                "BRIDGE_READ_TIMEOUT_SECONDS",
                var("BRIDGE_READ_TIMEOUT_SECONDS"),
            )?
            .unwrap_or(DEFAULT_READ_TIMEOUT.as_secs()),
            connect_timeout_seconds: parse_number(
                "BRIDGE_CONNECT_TIMEOUT_SECONDS",
                var("BRIDGE_CONNECT_TIMEOUT_SECONDS"),
            )?
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT.as_secs()),
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS"),
            rate_limit_requests_per_second: parse_number(
                "RATE_LIMIT_REQUESTS_PER_SECOND",
                var("RATE_LIMIT_REQUESTS_PER_SECOND"),
            )?
            .unwrap_or(DEFAULT_RATE_LIMIT_RPS),
            rate_limit_burst_size: parse_number(
                "RATE_LIMIT_BURST_SIZE",
                var("RATE_LIMIT_BURST_SIZE"),
            )?
            .unwrap_or(DEFAULT_RATE_LIMIT_BURST),
            max_concurrent_calls: parse_number("MAX_CONCURRENT_CALLS", var("MAX_CONCURRENT_CALLS"))?,
        };

        validation::validate(&config)?;

        Ok(config)
    }
}
