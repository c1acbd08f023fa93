use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use shoplive_core::codec::SUPPORTED_SAMPLE_RATES;
use tracing::warn;

use crate::error::AudioError;

/// Creates a mono resampler converting `in_rate` to `out_rate` in fixed input chunks.
///
/// Both rates must lie in [`SUPPORTED_SAMPLE_RATES`]; rubato allocates output
/// buffers from the ratio and a degenerate one aborts the process.
pub fn create_resampler(
    in_rate: u32,
    out_rate: u32,
    chunk_size: usize,
) -> Result<FastFixedIn<f32>, AudioError> {
    for rate in [in_rate, out_rate] {
        if !SUPPORTED_SAMPLE_RATES.contains(&rate) {
            return Err(AudioError::Device(format!("unsupported sample rate {}Hz", rate)));
        }
    }
    FastFixedIn::<f32>::new(
        out_rate as f64 / in_rate as f64,
        1.0,                     // Fixed ratio
        PolynomialDegree::Cubic, // Cubic interpolation for quality
        chunk_size,
        1, // 1 channel (mono)
    )
    .map_err(|e| AudioError::Device(format!("cannot resample {}Hz to {}Hz: {}", in_rate, out_rate, e)))
}

/// Resamples an unbounded mono stream delivered in arbitrary slice sizes.
///
/// Input is buffered until a full chunk is available, so output lags input by
/// at most one chunk. Equal rates pass through untouched.
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    chunk_size: usize,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_rate: u32, out_rate: u32, chunk_size: usize) -> Result<Self, AudioError> {
        let inner = if in_rate == out_rate && SUPPORTED_SAMPLE_RATES.contains(&in_rate) {
            None
        } else {
            Some(create_resampler(in_rate, out_rate, chunk_size)?)
        };
        Ok(Self {
            inner,
            chunk_size,
            pending: Vec::with_capacity(chunk_size * 2),
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.inner.as_mut() else {
            return samples.to_vec();
        };

        self.pending.extend_from_slice(samples);
        let mut output = Vec::new();
        while self.pending.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_size).collect();
            match resampler.process(std::slice::from_ref(&chunk), None) {
                Ok(channels) => {
                    if let Some(mono) = channels.into_iter().next() {
                        output.extend(mono);
                    }
                }
                Err(e) => warn!(error = %e, "Resampling failed; dropping chunk"),
            }
        }
        output
    }

    /// Drops buffered input and filter state.
    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(resampler) = self.inner.as_mut() {
            resampler.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_resampler() {
        assert!(create_resampler(48_000, 16_000, 480).is_ok());
        assert!(create_resampler(24_000, 44_100, 1024).is_ok());
    }

    #[test]
    fn test_degenerate_rates_are_rejected() {
        assert!(create_resampler(0, 48_000, 240).is_err());
        assert!(create_resampler(1, 48_000, 240).is_err());
        assert!(create_resampler(24_000, 0, 240).is_err());
        assert!(StreamResampler::new(0, 48_000, 240).is_err());
        assert!(StreamResampler::new(0, 0, 240).is_err());
    }

    #[test]
    fn test_equal_rates_pass_through() {
        let mut resampler = StreamResampler::new(16_000, 16_000, 128).unwrap();
        assert!(resampler.is_passthrough());
        assert_eq!(resampler.process(&[0.1, 0.2, 0.3]), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_partial_chunks_are_buffered() {
        let mut resampler = StreamResampler::new(48_000, 16_000, 480).unwrap();
        assert!(resampler.process(&[0.0; 100]).is_empty());
        assert!(resampler.process(&[0.0; 300]).is_empty());
        assert!(!resampler.process(&[0.0; 80]).is_empty());
    }

    #[test]
    fn test_downsampling_ratio() {
        let mut resampler = StreamResampler::new(48_000, 16_000, 480).unwrap();
        let input: Vec<f32> = (0..4800).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let mut produced = 0;
        for slice in input.chunks(333) {
            produced += resampler.process(slice).len();
        }
        // 4800 samples at a third of the rate, all chunks complete.
        assert!((1520..=1680).contains(&produced), "produced {}", produced);
    }

    #[test]
    fn test_reset_discards_pending_input() {
        let mut resampler = StreamResampler::new(48_000, 16_000, 480).unwrap();
        resampler.process(&[0.0; 400]);
        resampler.reset();
        assert!(resampler.process(&[0.0; 100]).is_empty());
    }
}
