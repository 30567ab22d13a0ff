use std::str::FromStr;

use crate::core::codec::AudioFormat;

/// Parse an optional numeric value, naming the source key on failure.
pub(super) fn parse_number<T>(
    key: &str,
    value: Option<String>,
) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| format!("Invalid {key} value '{v}': {e}").into())
        })
        .transpose()
}

/// Accepts `true/false`, `1/0`, `yes/no`, `on/off` in any case.
pub(super) fn parse_bool(
    key: &str,
    value: Option<String>,
) -> Result<Option<bool>, Box<dyn std::error::Error>> {
    value
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(format!("Invalid {key} value '{v}': expected a boolean").into()),
        })
        .transpose()
}

pub(super) fn parse_audio_format(value: &str) -> Result<AudioFormat, Box<dyn std::error::Error>> {
    AudioFormat::parse(value).map_err(|e| format!("Invalid audio format: {e}").into())
}
