//! Audio Test Fixtures
//!
//! Programmatically generated telephony audio so tests have no file
//! dependencies:
//! - G.711 μ-law at 8 kHz (8 bytes per ms)
//! - PCM16 little-endian at 24 kHz (48 bytes per ms)

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use std::f32::consts::PI;

/// μ-law bytes per 20 ms telephony frame
pub const ULAW_FRAME_20MS: usize = 160;

/// PCM16 bytes per 20 ms at 24 kHz
pub const PCM16_FRAME_20MS: usize = 960;

/// μ-law encoding of digital silence
pub const ULAW_SILENCE: u8 = 0xFF;

/// Encode one 16-bit sample as G.711 μ-law.
pub fn linear_to_ulaw(sample: i16) -> u8 {
    const BIAS: i32 = 0x84;
    const CLIP: i32 = 32635;

    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    pcm = pcm.min(CLIP) + BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !(sign | (exponent << 4) as i32 | mantissa) as u8
}

/// μ-law silence of the given duration.
pub fn ulaw_silence(duration_ms: usize) -> Vec<u8> {
    vec![ULAW_SILENCE; duration_ms * 8]
}

/// μ-law sine tone at 8 kHz.
pub fn ulaw_tone(frequency: f32, duration_ms: usize) -> Vec<u8> {
    let samples = duration_ms * 8;
    (0..samples)
        .map(|i| {
            let t = i as f32 / 8000.0;
            let sample = (0.5 * (2.0 * PI * frequency * t).sin() * i16::MAX as f32) as i16;
            linear_to_ulaw(sample)
        })
        .collect()
}

/// PCM16 sine tone at 24 kHz, little-endian.
pub fn pcm16_tone(frequency: f32, duration_ms: usize) -> Vec<u8> {
    let samples = duration_ms * 24;
    (0..samples)
        .flat_map(|i| {
            let t = i as f32 / 24000.0;
            let sample = (0.5 * (2.0 * PI * frequency * t).sin() * i16::MAX as f32) as i16;
            sample.to_le_bytes()
        })
        .collect()
}

/// Base64 payload as carried in media frames.
pub fn b64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        assert_eq!(ulaw_silence(20).len(), ULAW_FRAME_20MS);
        assert_eq!(ulaw_tone(440.0, 20).len(), ULAW_FRAME_20MS);
        assert_eq!(pcm16_tone(440.0, 20).len(), PCM16_FRAME_20MS);
    }

    #[test]
    fn test_ulaw_zero_is_silence() {
        assert_eq!(linear_to_ulaw(0), ULAW_SILENCE);
    }
}
