//! The voice window: whether captured audio is currently worth forwarding.

use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::vad::VadReport;

/// A change of the window's silence state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowTransition {
    VoiceStarted,
    /// Voice stopped after the hangover; carries the observed forwarding throughput.
    VoiceStopped { samples_per_sec: f64 },
}

#[derive(Debug, Clone)]
pub struct VoiceWindow {
    is_silence: bool,
    last_voice_at: Option<Instant>,
    samples_since_voice: u64,
    hangover: Duration,
}

impl VoiceWindow {
    pub fn new(hangover: Duration) -> Self {
        Self {
            is_silence: true,
            last_voice_at: None,
            samples_since_voice: 0,
            hangover,
        }
    }

    pub fn is_silence(&self) -> bool {
        self.is_silence
    }

    pub fn last_voice_at(&self) -> Option<Instant> {
        self.last_voice_at
    }

    pub fn samples_since_voice(&self) -> u64 {
        self.samples_since_voice
    }

    /// Counts samples forwarded since the last voice report.
    pub fn record_forwarded(&mut self, samples: usize) {
        self.samples_since_voice += samples as u64;
    }

    /// Applies one VAD report received at `now`.
    pub fn apply(&mut self, report: VadReport, now: Instant) -> Option<WindowTransition> {
        if report.voice {
            let started = self.is_silence;
            self.is_silence = false;
            self.last_voice_at = Some(now);
            self.samples_since_voice = 0;
            if started {
                info!(rms = report.rms, "Voice detected");
                return Some(WindowTransition::VoiceStarted);
            }
            return None;
        }

        // Never heard voice: already silent.
        let last_voice_at = self.last_voice_at?;
        let elapsed = now.saturating_duration_since(last_voice_at);
        if elapsed <= self.hangover {
            return None;
        }
        let was_active = !self.is_silence;
        self.is_silence = true;
        if !was_active {
            return None;
        }

        let secs = elapsed.as_secs_f64();
        let samples_per_sec = if secs > 0.0 {
            self.samples_since_voice as f64 / secs
        } else {
            0.0
        };
        info!(samples_per_sec, "Voice stopped");
        Some(WindowTransition::VoiceStopped { samples_per_sec })
    }
}
