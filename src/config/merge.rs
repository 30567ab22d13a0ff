use super::utils::parse_audio_format;
use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig};

/// Merge YAML overrides on top of the environment configuration.
///
/// Priority: YAML > environment (including `.env`) > defaults.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls {
            match tls.enabled {
                Some(false) => config.tls = None,
                _ => match (tls.cert_path, tls.key_path) {
                    (Some(cert_path), Some(key_path)) => {
                        config.tls = Some(TlsConfig {
                            cert_path,
                            key_path,
                        });
                    }
                    (None, None) if tls.enabled != Some(true) => {}
                    _ => {
                        return Err(
                            "server.tls requires both cert_path and key_path when enabled".into(),
                        );
                    }
                },
            }
        }
    }

    if let Some(realtime) = yaml.realtime {
        if let Some(api_key) = realtime.api_key {
            config.openai_api_key = Some(api_key);
        }
        if let Some(url) = realtime.url {
            config.realtime_url = url;
        }
        if let Some(model) = realtime.model {
            config.realtime_model = model;
        }
        if let Some(format) = realtime.audio_format {
            config.audio_format = Some(parse_audio_format(&format)?);
        }
    }

    if let Some(agent) = yaml.agent {
        if agent.instructions.is_some() {
            config.agent.instructions = agent.instructions;
        }
        if let Some(voice) = agent.voice {
            config.agent.voice = voice;
        }
        if agent.temperature.is_some() {
            config.agent.temperature = agent.temperature;
        }
        if agent.transcription_model.is_some() {
            config.agent.transcription_model = agent.transcription_model;
        }
        if let Some(greeting) = agent.greeting {
            config.greeting_enabled = greeting;
        }
    }

    if let Some(bridge) = yaml.bridge {
        if let Some(max) = bridge.max_pending_frames {
            config.max_pending_frames = max;
        }
        if let Some(secs) = bridge.read_timeout_seconds {
            config.read_timeout_seconds = secs;
        }
        if let Some(secs) = bridge.connect_timeout_seconds {
            config.connect_timeout_seconds = secs;
        }
    }

    if let Some(security) = yaml.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
        if security.max_concurrent_calls.is_some() {
            config.max_concurrent_calls = security.max_concurrent_calls;
        }
    }

    Ok(config)
}
