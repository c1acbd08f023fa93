//! Energy-based voice activity detection.
//!
//! The stage runs on the audio callback thread and only classifies blocks.
//! Hysteresis lives in [`VoiceWindow`](crate::window::VoiceWindow), which
//! consumes the reports on the runtime side.

use std::time::Duration;

/// Default RMS level at or above which a block counts as voice.
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.01;
/// Default time silence must persist before voice is considered stopped.
pub const DEFAULT_HANGOVER: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadConfig {
    /// Blocks below this RMS are candidate silence.
    pub energy_threshold: f32,
    /// Minimum voice-to-silence transition delay.
    pub hangover: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_threshold: DEFAULT_ENERGY_THRESHOLD,
            hangover: DEFAULT_HANGOVER,
        }
    }
}

/// Classification of one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadReport {
    pub voice: bool,
    pub rms: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct VadStage {
    threshold: f32,
}

impl VadStage {
    pub fn new(config: &VadConfig) -> Self {
        Self {
            threshold: config.energy_threshold,
        }
    }

    pub fn process(&self, block: &[f32]) -> VadReport {
        let rms = calculate_rms(block);
        VadReport {
            voice: rms >= self.threshold,
            rms,
        }
    }
}

/// Root-mean-square of a block; 0 for an empty block.
pub fn calculate_rms(block: &[f32]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = block.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_squares / block.len() as f64).sqrt() as f32
}
