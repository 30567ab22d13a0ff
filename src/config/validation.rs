use super::ServerConfig;
use crate::core::realtime::RealtimeCredentials;

/// Validate a fully merged configuration.
///
/// The API key is not required here: the server can start without one and
/// every call then fails its realtime handshake with `MissingApiKey`.
pub(super) fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_realtime_url(&config.realtime_url, &config.realtime_model)?;
    validate_bridge_limits(
        config.max_pending_frames,
        config.read_timeout_seconds,
        config.connect_timeout_seconds,
    )?;
    validate_max_concurrent_calls(config.max_concurrent_calls)?;
    validate_rate_limit(
        config.rate_limit_requests_per_second,
        config.rate_limit_burst_size,
    )?;
    Ok(())
}

pub(super) fn validate_realtime_url(
    url: &str,
    model: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if model.trim().is_empty() {
        return Err("Realtime model must not be empty".into());
    }
    RealtimeCredentials::new(String::new())
        .with_url(url)
        .with_model(model)
        .ws_url()
        .map_err(|e| format!("Invalid realtime URL: {e}"))?;
    Ok(())
}

pub(super) fn validate_bridge_limits(
    max_pending_frames: usize,
    read_timeout_seconds: u64,
    connect_timeout_seconds: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    if max_pending_frames == 0 {
        return Err("max_pending_frames must be at least 1".into());
    }
    if read_timeout_seconds == 0 {
        return Err("read_timeout_seconds must be at least 1".into());
    }
    if connect_timeout_seconds == 0 {
        return Err("connect_timeout_seconds must be at least 1".into());
    }
    Ok(())
}

pub(super) fn validate_max_concurrent_calls(
    max: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    if max == Some(0) {
        return Err("max_concurrent_calls must be at least 1 when set".into());
    }
    Ok(())
}

pub(super) fn validate_rate_limit(
    requests_per_second: u32,
    burst_size: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if requests_per_second == 0 || burst_size == 0 {
        return Err("rate limit requests per second and burst size must be at least 1".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_realtime_url() {
        assert!(validate_realtime_url("wss://api.openai.com/v1/realtime", "gpt-realtime").is_ok());
        assert!(validate_realtime_url("ws://127.0.0.1:9000", "m").is_ok());

        let err = validate_realtime_url("https://api.openai.com/v1/realtime", "m").unwrap_err();
        assert!(err.to_string().contains("Invalid realtime URL"));
        assert!(validate_realtime_url("wss://api.openai.com/v1/realtime", " ").is_err());
    }

    #[test]
    fn test_validate_bridge_limits() {
        assert!(validate_bridge_limits(256, 60, 10).is_ok());
        assert!(validate_bridge_limits(0, 60, 10).is_err());
        assert!(validate_bridge_limits(1, 0, 10).is_err());
        assert!(validate_bridge_limits(1, 1, 0).is_err());
    }

    #[test]
    fn test_validate_max_concurrent_calls() {
        assert!(validate_max_concurrent_calls(None).is_ok());
        assert!(validate_max_concurrent_calls(Some(10)).is_ok());
        assert!(validate_max_concurrent_calls(Some(0)).is_err());
    }

    #[test]
    fn test_validate_rate_limit() {
        assert!(validate_rate_limit(60, 10).is_ok());
        assert!(validate_rate_limit(0, 10).is_err());
        assert!(validate_rate_limit(60, 0).is_err());
    }
}
