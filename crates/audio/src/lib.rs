//! Microphone capture and speaker playback for a live shopping session.
//!
//! Capture forwards only voiced 16 kHz blocks as `audio/pcm` envelopes;
//! playback queues the agent's PCM and can be flushed when it is interrupted.

pub mod capture;
pub mod error;
pub mod playback;
pub mod resample;
pub mod vad;
pub mod window;

pub use capture::{
    CaptureConfig, CaptureEvent, CaptureHandle, CaptureMessage, CapturePipeline, CapturePump,
};
pub use error::AudioError;
pub use playback::{PlaybackConfig, PlaybackPipeline};
pub use vad::{VadConfig, VadReport, VadStage};
pub use window::{VoiceWindow, WindowTransition};
