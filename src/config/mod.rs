//! Configuration module for the media bridge server
//!
//! Handles configuration from `.env` files, YAML files and environment
//! variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Value parsing helpers
//!
//! # Example
//! ```rust,no_run
//! use waav_media_bridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

use crate::core::bridge::{AudioFormatPolicy, BridgeOptions};
use crate::core::codec::AudioFormat;
use crate::core::realtime::{AgentConfig, RealtimeConnector, RealtimeCredentials};

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the bridge server:
/// - Server settings (host, port, TLS)
/// - Realtime API endpoint, model and key
/// - Agent behaviour sent in `session.update`
/// - Per-call bridge limits
/// - Security settings (CORS, concurrent call limit)
#[derive(Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,

    // Realtime API
    pub openai_api_key: Option<String>,
    pub realtime_url: String,
    pub realtime_model: String,
    /// Explicit session audio format; `None` uses the policy default
    pub audio_format: Option<AudioFormat>,

    // Agent
    pub agent: AgentConfig,
    /// Send `response.create` right after connecting so the agent speaks first
    pub greeting_enabled: bool,

    // Bridge limits
    pub max_pending_frames: usize,
    pub read_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,

    // Security
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address (>= 100000 disables limiting)
    pub rate_limit_requests_per_second: u32,
    pub rate_limit_burst_size: u32,
    /// Maximum concurrent bridged calls (`None` = unlimited)
    pub max_concurrent_calls: Option<usize>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("realtime_url", &self.realtime_url)
            .field("realtime_model", &self.realtime_model)
            .field("audio_format", &self.audio_format)
            .field("agent", &self.agent)
            .field("greeting_enabled", &self.greeting_enabled)
            .field("max_pending_frames", &self.max_pending_frames)
            .field("read_timeout_seconds", &self.read_timeout_seconds)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field(
                "rate_limit_requests_per_second",
                &self.rate_limit_requests_per_second,
            )
            .field("rate_limit_burst_size", &self.rate_limit_burst_size)
            .field("max_concurrent_calls", &self.max_concurrent_calls)
            .finish()
    }
}

/// Zeroize the API key when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable fallback
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is malformed,
    /// or the merged configuration fails validation.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded in main.rs at startup, so by the time we get here
        // environment variables already include it. YAML overrides both.
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let config = merge::merge_config(Some(yaml_config))?;

        validation::validate(&config)?;

        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Credentials for the realtime handshake.
    ///
    /// A missing key yields empty credentials; the connector rejects them
    /// with `ConnectError::MissingApiKey` so the failure is reported per call.
    pub fn credentials(&self) -> RealtimeCredentials {
        RealtimeCredentials::new(self.openai_api_key.clone().unwrap_or_default())
            .with_url(self.realtime_url.clone())
            .with_model(self.realtime_model.clone())
    }

    /// Per-call bridge options built from this configuration.
    pub fn bridge_options(&self, connector: Arc<dyn RealtimeConnector>) -> BridgeOptions {
        let mut options = BridgeOptions::new(connector)
            .with_format_policy(AudioFormatPolicy::default())
            .with_agent(self.agent.clone())
            .with_max_pending_frames(self.max_pending_frames)
            .with_read_timeout(Duration::from_secs(self.read_timeout_seconds))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_seconds));
        if let Some(format) = self.audio_format {
            options = options.with_audio_format(format);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::OpenAIRealtimeConnector;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    const ENV_KEYS: &[&str] = &[
        "HOST",
        "PORT",
        "TLS_CERT_PATH",
        "TLS_KEY_PATH",
        "OPENAI_API_KEY",
        "OPENAI_REALTIME_URL",
        "OPENAI_REALTIME_MODEL",
        "AUDIO_FORMAT",
        "AGENT_INSTRUCTIONS",
        "AGENT_VOICE",
        "AGENT_TEMPERATURE",
        "TRANSCRIPTION_MODEL",
        "BRIDGE_MAX_PENDING_FRAMES",
        "BRIDGE_READ_TIMEOUT_SECONDS",
        "BRIDGE_CONNECT_TIMEOUT_SECONDS",
        "MAX_CONCURRENT_CALLS",
        "GREETING_ENABLED",
        "CORS_ALLOWED_ORIGINS",
        "RATE_LIMIT_REQUESTS_PER_SECOND",
        "RATE_LIMIT_BURST_SIZE",
    ];

    fn cleanup_env_vars() {
        unsafe {
            for key in ENV_KEYS {
                env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ServerConfig::from_env().unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5050);
        assert!(!config.is_tls_enabled());
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.realtime_url, "wss://api.openai.com/v1/realtime");
        assert_eq!(config.realtime_model, "gpt-4o-realtime-preview");
        assert!(config.audio_format.is_none());
        assert_eq!(config.agent.voice, "alloy");
        assert!(config.greeting_enabled);
        assert_eq!(config.max_pending_frames, 256);
        assert_eq!(config.read_timeout_seconds, 60);
        assert_eq!(config.connect_timeout_seconds, 10);
        assert!(config.max_concurrent_calls.is_none());
        assert_eq!(config.rate_limit_requests_per_second, 60);
        assert_eq!(config.rate_limit_burst_size, 10);
    }

    #[test]
    #[serial]
    fn test_from_env_values() {
        cleanup_env_vars();
        unsafe {
            env::set_var("HOST", "127.0.0.1");
            env::set_var("PORT", "8443");
            env::set_var("OPENAI_API_KEY", "sk-env");
            env::set_var("AUDIO_FORMAT", "pcm16");
            env::set_var("AGENT_INSTRUCTIONS", "Greet the caller.");
            env::set_var("AGENT_TEMPERATURE", "0.7");
            env::set_var("GREETING_ENABLED", "false");
            env::set_var("MAX_CONCURRENT_CALLS", "3");
        }

        let config = ServerConfig::from_env().unwrap();

        assert_eq!(config.address(), "127.0.0.1:8443");
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.audio_format, Some(AudioFormat::Pcm16));
        assert_eq!(
            config.agent.instructions.as_deref(),
            Some("Greet the caller.")
        );
        assert_eq!(config.agent.temperature, Some(0.7));
        assert!(!config.greeting_enabled);
        assert_eq!(config.max_concurrent_calls, Some(3));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_values() {
        cleanup_env_vars();

        unsafe { env::set_var("PORT", "not-a-port") };
        assert!(ServerConfig::from_env().is_err());
        cleanup_env_vars();

        unsafe { env::set_var("AUDIO_FORMAT", "opus") };
        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("Invalid audio format"));
        cleanup_env_vars();

        unsafe { env::set_var("TLS_CERT_PATH", "/tmp/cert.pem") };
        assert!(ServerConfig::from_env().is_err());
        cleanup_env_vars();

        unsafe { env::set_var("BRIDGE_MAX_PENDING_FRAMES", "0") };
        assert!(ServerConfig::from_env().is_err());
        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080

realtime:
  api_key: "sk-yaml"
  audio_format: "g711_ulaw"

agent:
  voice: "verse"
  greeting: false

bridge:
  max_pending_frames: 32
"#;
        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("HOST", "0.0.0.0");
            env::set_var("OPENAI_API_KEY", "sk-env");
            env::set_var("AUDIO_FORMAT", "pcm16");
            env::set_var("OPENAI_REALTIME_MODEL", "gpt-realtime");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-yaml"));
        assert_eq!(config.audio_format, Some(AudioFormat::G711Ulaw));
        assert_eq!(config.agent.voice, "verse");
        assert!(!config.greeting_enabled);
        assert_eq!(config.max_pending_frames, 32);
        // ENV value where YAML is silent
        assert_eq!(config.realtime_model, "gpt-realtime");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_tls() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
server:
  tls:
    enabled: true
    cert_path: "/tmp/cert.pem"
    key_path: "/tmp/key.pem"
"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();
        let tls = config.tls.as_ref().unwrap();
        assert_eq!(tls.cert_path, PathBuf::from("/tmp/cert.pem"));
        assert_eq!(tls.key_path, PathBuf::from("/tmp/key.pem"));

        fs::write(
            &config_path,
            "server:\n  tls:\n    enabled: true\n    cert_path: \"/tmp/cert.pem\"\n",
        )
        .unwrap();
        assert!(ServerConfig::from_file(&config_path).is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = PathBuf::from("/nonexistent/config.yaml");
        let result = ServerConfig::from_file(&config_path);

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_invalid_realtime_url() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            "realtime:\n  url: \"https://api.openai.com/v1/realtime\"\n",
        )
        .unwrap();

        let err = ServerConfig::from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("Invalid realtime URL"));
    }

    #[test]
    #[serial]
    fn test_credentials_and_bridge_options() {
        cleanup_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "sk-test");
            env::set_var("OPENAI_REALTIME_URL", "ws://127.0.0.1:9000/v1/realtime");
            env::set_var("AUDIO_FORMAT", "pcm16");
            env::set_var("BRIDGE_READ_TIMEOUT_SECONDS", "5");
        }

        let config = ServerConfig::from_env().unwrap();

        let creds = config.credentials();
        assert_eq!(creds.api_key, "sk-test");
        assert_eq!(
            creds.ws_url().unwrap().as_str(),
            "ws://127.0.0.1:9000/v1/realtime?model=gpt-4o-realtime-preview"
        );

        let options = config.bridge_options(Arc::new(OpenAIRealtimeConnector::new()));
        assert_eq!(options.audio_format, Some(AudioFormat::Pcm16));
        assert_eq!(options.read_timeout, Duration::from_secs(5));
        assert_eq!(options.max_pending_frames, 256);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_debug_redacts_api_key() {
        cleanup_env_vars();
        unsafe { env::set_var("OPENAI_API_KEY", "sk-very-secret") };

        let config = ServerConfig::from_env().unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));

        cleanup_env_vars();
    }
}
