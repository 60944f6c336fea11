//! Audio processing
//!
//! Pure codec utilities plus the capture and playback pipelines. The wire
//! carries 16-bit signed little-endian PCM, mono, base64-encoded: 16 kHz
//! toward the model, 24 kHz back from it.

mod capture;
mod playback;

pub use capture::{CAPTURE_RATE, CapturePipeline, NATIVE_RATE};
pub use playback::{AudioSink, CpalSink, PLAYBACK_RATE, PlaybackPipeline};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// Resample by nearest-neighbor decimation.
///
/// For each output index `i`, selects the input sample at
/// `floor(i * in_rate / out_rate)`; output length is
/// `floor(len * out_rate / in_rate)`. No anti-aliasing filter — lossy, but
/// fine for speech bandwidth at a 16 kHz target.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn resample(samples: &[f32], in_rate: u32, out_rate: u32) -> Vec<f32> {
    if in_rate == out_rate {
        return samples.to_vec();
    }

    let ratio = f64::from(in_rate) / f64::from(out_rate);
    let out_len = (samples.len() as f64 / ratio).floor() as usize;

    (0..out_len)
        .map(|i| samples[(i as f64 * ratio).floor() as usize])
        .collect()
}

/// Convert normalized f32 samples to 16-bit signed PCM.
///
/// Each sample is clamped to [-1.0, 1.0] and scaled by 32768 for negative
/// values, 32767 otherwise; the asymmetry keeps exactly +1.0 from
/// overflowing i16.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = s.clamp(-1.0, 1.0);
            if s < 0.0 { (s * 32768.0) as i16 } else { (s * 32767.0) as i16 }
        })
        .collect()
}

/// Convert 16-bit signed PCM to normalized f32 samples.
#[must_use]
pub fn pcm16_to_float(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| (f32::from(s) / 32767.0).clamp(-1.0, 1.0))
        .collect()
}

/// Encode a 16-bit sample buffer as base64 over its little-endian bytes.
#[must_use]
pub fn encode_base64(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    STANDARD.encode(bytes)
}

/// Decode a base64 payload back into 16-bit samples.
///
/// # Errors
///
/// Returns an error if the payload is not valid base64 or decodes to an odd
/// number of bytes.
pub fn decode_base64(data: &str) -> Result<Vec<i16>> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| Error::Audio(format!("invalid base64 audio: {e}")))?;

    if bytes.len() % 2 != 0 {
        return Err(Error::Audio(format!(
            "PCM payload has odd byte count: {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trips() {
        let samples: Vec<i16> = vec![0, 1, -1, 32767, -32768, 12345, -12345];
        let encoded = encode_base64(&samples);
        assert_eq!(decode_base64(&encoded).unwrap(), samples);
    }

    #[test]
    fn base64_round_trips_empty() {
        assert_eq!(decode_base64(&encode_base64(&[])).unwrap(), Vec::<i16>::new());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_base64("not base64!!").is_err());
    }

    #[test]
    fn decode_rejects_odd_byte_count() {
        // one byte, valid base64
        let encoded = STANDARD.encode([0u8]);
        assert!(decode_base64(&encoded).is_err());
    }

    #[test]
    fn resample_48k_to_16k_decimates_by_three() {
        let samples: Vec<f32> = (0..2048).map(|i| i as f32).collect();
        let out = resample(&samples, 48000, 16000);
        assert_eq!(out.len(), samples.len() / 3);
        // nearest-neighbor picks every third sample
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 3.0);
        assert_eq!(out[2], 6.0);
    }

    #[test]
    fn resample_identity_when_rates_match() {
        let samples = vec![0.5, -0.5, 0.25];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn resample_non_integer_ratio() {
        let samples = vec![0.0; 441];
        let out = resample(&samples, 44100, 16000);
        assert_eq!(out.len(), 160); // floor(441 * 16000 / 44100)
    }

    #[test]
    fn float_to_pcm16_clamps_symmetrically() {
        assert_eq!(float_to_pcm16(&[1.0, -1.0, 0.0]), vec![32767, -32768, 0]);
        // out-of-range input clamps instead of wrapping
        assert_eq!(float_to_pcm16(&[2.0, -2.0]), vec![32767, -32768]);
    }

    #[test]
    fn pcm16_to_float_stays_normalized() {
        let floats = pcm16_to_float(&[32767, -32768, 0]);
        assert!((floats[0] - 1.0).abs() < f32::EPSILON);
        assert!((floats[1] + 1.0).abs() < f32::EPSILON);
        assert_eq!(floats[2], 0.0);
        assert!(floats.iter().all(|s| (-1.0..=1.0).contains(s)));
    }
}
