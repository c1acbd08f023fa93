//! Stateless conversions between the wire representation and audio samples.
//!
//! PCM on the wire is 16-bit signed, little-endian, mono. Float samples are
//! nominally in `[-1.0, 1.0]`.

use crate::error::CodecError;
use base64::Engine;

/// Sample rate of the PCM stream the client sends upstream.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate the agent's voice is produced at unless the envelope says otherwise.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Sample rates audio may be played or captured at; anything else is rejected.
pub const SUPPORTED_SAMPLE_RATES: std::ops::RangeInclusive<u32> = 8_000..=192_000;

/// Scale between a float sample and its 16-bit representation (0x7fff).
pub const PCM_SCALE: f32 = 32767.0;

/// Encodes raw bytes as standard, padded base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decodes a standard, padded base64 string.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, CodecError> {
    Ok(base64::engine::general_purpose::STANDARD.decode(encoded)?)
}

/// Converts float samples to little-endian int16 PCM bytes using [`PCM_SCALE`].
pub fn pcm_from_float(samples: &[f32]) -> Vec<u8> {
    pcm_from_float_scaled(samples, PCM_SCALE)
}

/// Converts float samples to little-endian int16 PCM bytes with a custom scale.
///
/// Scaled values are clamped to the int16 range before conversion, so
/// out-of-range input saturates instead of wrapping. NaN becomes silence.
pub fn pcm_from_float_scaled(samples: &[f32], scale: f32) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let scaled = if sample.is_nan() {
            0.0
        } else {
            (sample * scale).clamp(i16::MIN as f32, i16::MAX as f32)
        };
        out.extend_from_slice(&(scaled as i16).to_le_bytes());
    }
    out
}

/// Inverse of [`pcm_from_float`].
pub fn float_from_pcm(bytes: &[u8]) -> Result<Vec<f32>, CodecError> {
    float_from_pcm_scaled(bytes, PCM_SCALE)
}

/// Inverse of [`pcm_from_float_scaled`]. Fails on an odd byte count.
pub fn float_from_pcm_scaled(bytes: &[u8], scale: f32) -> Result<Vec<f32>, CodecError> {
    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddPcmLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / scale)
        .collect())
}

/// Float samples to a base64 PCM payload, the shape carried by `audio/pcm` envelopes.
pub fn encode_f32_to_base64_pcm(samples: &[f32]) -> String {
    encode_base64(&pcm_from_float(samples))
}

/// Base64 PCM payload back to float samples.
pub fn decode_base64_pcm_to_f32(encoded: &str) -> Result<Vec<f32>, CodecError> {
    float_from_pcm(&decode_base64(encoded)?)
}
