//! Audio codec adapter.
//!
//! Both sides of the bridge carry audio as base64 text inside JSON frames.
//! The adapter validates a payload against the session format and converts
//! between the wire representation and raw bytes. No resampling or
//! companding happens here: a session picks one format end to end.
//!
//! Supported formats:
//! - `g711_ulaw`: G.711 u-law, 8 kHz, 1 byte per sample
//! - `pcm16`: 16-bit signed little-endian PCM, 24 kHz mono, 2 bytes per sample

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::{BridgeError, BridgeResult};

/// Sample rate used by the telephony u-law encoding.
pub const G711_SAMPLE_RATE: u32 = 8000;

/// Sample rate used by the realtime PCM16 encoding.
pub const PCM16_SAMPLE_RATE: u32 = 24000;

/// Audio encodings the bridge can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AudioFormat {
    /// G.711 u-law at 8 kHz (default)
    #[default]
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
    /// PCM 16-bit signed little-endian at 24 kHz
    #[serde(rename = "pcm16")]
    Pcm16,
}

impl AudioFormat {
    /// Wire name used in realtime `session.update` events.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::G711Ulaw => "g711_ulaw",
            Self::Pcm16 => "pcm16",
        }
    }

    /// Fixed sample rate for this format.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::G711Ulaw => G711_SAMPLE_RATE,
            Self::Pcm16 => PCM16_SAMPLE_RATE,
        }
    }

    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::G711Ulaw => 1,
            Self::Pcm16 => 2,
        }
    }

    /// Bytes of audio per millisecond (8 for u-law, 48 for PCM16).
    #[inline]
    pub fn bytes_per_ms(&self) -> usize {
        self.sample_rate() as usize * self.bytes_per_sample() / 1000
    }

    /// Parse a format name.
    ///
    /// Accepts the wire names case-insensitively plus the common aliases used
    /// by telephony gateways and config files.
    pub fn parse(s: &str) -> BridgeResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "g711_ulaw" | "ulaw" | "mulaw" | "pcmu" | "audio/x-mulaw" => Ok(Self::G711Ulaw),
            "pcm16" | "pcm" | "linear16" | "l16" | "audio/l16" => Ok(Self::Pcm16),
            other => Err(BridgeError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Map a telephony `start.mediaFormat` to a format.
    ///
    /// The sample rate must match the format's fixed rate; a mismatch would
    /// require resampling and is rejected.
    pub fn from_media_format(encoding: &str, sample_rate: u32) -> BridgeResult<Self> {
        let format = Self::parse(encoding)?;
        if format.sample_rate() != sample_rate {
            return Err(BridgeError::UnsupportedFormat(format!(
                "{encoding} at {sample_rate}Hz (expected {}Hz)",
                format.sample_rate()
            )));
        }
        Ok(format)
    }

    fn validate(&self, raw: &[u8]) -> BridgeResult<()> {
        if raw.len() % self.bytes_per_sample() != 0 {
            return Err(BridgeError::MalformedFrame(format!(
                "{} payload has odd length {}",
                self.as_str(),
                raw.len()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Encode raw audio into a base64 wire payload for `format`.
pub fn encode(raw: &[u8], format: AudioFormat) -> BridgeResult<String> {
    format.validate(raw)?;
    Ok(BASE64_STANDARD.encode(raw))
}

/// Decode a base64 wire payload into raw audio, validating it for `format`.
pub fn decode(payload: &str, format: AudioFormat) -> BridgeResult<Bytes> {
    let raw = BASE64_STANDARD
        .decode(payload)
        .map_err(|e| BridgeError::MalformedFrame(format!("invalid base64 audio: {e}")))?;
    format.validate(&raw)?;
    Ok(Bytes::from(raw))
}

/// Milliseconds of audio represented by `len` bytes in `format`.
#[inline]
pub fn duration_ms(len: usize, format: AudioFormat) -> u64 {
    (len / format.bytes_per_ms()) as u64
}

/// Number of bytes holding `ms` milliseconds of audio in `format`.
#[inline]
pub fn bytes_for_ms(ms: u64, format: AudioFormat) -> usize {
    ms as usize * format.bytes_per_ms()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_ulaw() {
        assert_eq!(AudioFormat::default(), AudioFormat::G711Ulaw);
        assert_eq!(AudioFormat::default().as_str(), "g711_ulaw");
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(AudioFormat::parse("G711_ULAW").unwrap(), AudioFormat::G711Ulaw);
        assert_eq!(AudioFormat::parse("audio/x-mulaw").unwrap(), AudioFormat::G711Ulaw);
        assert_eq!(AudioFormat::parse("pcmu").unwrap(), AudioFormat::G711Ulaw);
        assert_eq!(AudioFormat::parse("pcm16").unwrap(), AudioFormat::Pcm16);
        assert_eq!(AudioFormat::parse("linear16").unwrap(), AudioFormat::Pcm16);
        assert_eq!("l16".parse::<AudioFormat>().unwrap(), AudioFormat::Pcm16);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = AudioFormat::parse("g711_alaw").unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedFormat(_)));
        assert!(AudioFormat::parse("opus").is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&AudioFormat::G711Ulaw).unwrap();
        assert_eq!(json, "\"g711_ulaw\"");
        let fmt: AudioFormat = serde_json::from_str("\"pcm16\"").unwrap();
        assert_eq!(fmt, AudioFormat::Pcm16);
    }

    #[test]
    fn test_round_trip_ulaw() {
        let raw: Vec<u8> = (0..=255).collect();
        let wire = encode(&raw, AudioFormat::G711Ulaw).unwrap();
        assert_eq!(decode(&wire, AudioFormat::G711Ulaw).unwrap().as_ref(), &raw[..]);
    }

    #[test]
    fn test_round_trip_pcm16() {
        let samples: Vec<i16> = vec![0, 1, -1, i16::MAX, i16::MIN, 1234];
        let raw: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let wire = encode(&raw, AudioFormat::Pcm16).unwrap();
        assert_eq!(decode(&wire, AudioFormat::Pcm16).unwrap().as_ref(), &raw[..]);
    }

    #[test]
    fn test_pcm16_rejects_odd_length() {
        assert!(matches!(
            encode(&[1, 2, 3], AudioFormat::Pcm16),
            Err(BridgeError::MalformedFrame(_))
        ));
        let wire = BASE64_STANDARD.encode([1u8, 2, 3]);
        assert!(decode(&wire, AudioFormat::Pcm16).is_err());
        // Any length is valid for u-law
        assert!(decode(&wire, AudioFormat::G711Ulaw).is_ok());
    }

    #[test]
    fn test_decode_invalid_base64() {
        let err = decode("not base64!!", AudioFormat::G711Ulaw).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedFrame(_)));
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(encode(&[], AudioFormat::Pcm16).unwrap(), "");
        assert!(decode("", AudioFormat::G711Ulaw).unwrap().is_empty());
    }

    #[test]
    fn test_duration() {
        assert_eq!(AudioFormat::G711Ulaw.bytes_per_ms(), 8);
        assert_eq!(AudioFormat::Pcm16.bytes_per_ms(), 48);
        assert_eq!(duration_ms(1600, AudioFormat::G711Ulaw), 200);
        assert_eq!(duration_ms(9600, AudioFormat::Pcm16), 200);
        assert_eq!(bytes_for_ms(20, AudioFormat::G711Ulaw), 160);
        assert_eq!(bytes_for_ms(20, AudioFormat::Pcm16), 960);
    }

    #[test]
    fn test_from_media_format() {
        assert_eq!(
            AudioFormat::from_media_format("audio/x-mulaw", 8000).unwrap(),
            AudioFormat::G711Ulaw
        );
        assert_eq!(
            AudioFormat::from_media_format("audio/L16", 24000).unwrap(),
            AudioFormat::Pcm16
        );
        assert!(AudioFormat::from_media_format("audio/x-mulaw", 16000).is_err());
        assert!(AudioFormat::from_media_format("audio/opus", 48000).is_err());
    }
}
