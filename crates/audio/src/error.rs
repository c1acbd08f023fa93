use thiserror::Error;

/// Failures of the capture and playback pipelines.
///
/// Only `Permission` and `Device` are returned from `start`; `Stream` covers
/// faults of an already running stream and is logged rather than returned.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Microphone access was denied: {0}")]
    Permission(String),
    #[error("No usable audio device: {0}")]
    Device(String),
    #[error("Audio stream error: {0}")]
    Stream(String),
}

impl AudioError {
    /// Classifies a stream build failure.
    ///
    /// Backends report a refused microphone as a generic backend error, so the
    /// message text is the only signal available.
    pub fn from_build_error(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                AudioError::Device("device is no longer available".to_string())
            }
            cpal::BuildStreamError::StreamConfigNotSupported => {
                AudioError::Device("device does not support the stream configuration".to_string())
            }
            cpal::BuildStreamError::BackendSpecific { err } => {
                let message = err.description;
                if looks_like_permission_denial(&message) {
                    AudioError::Permission(message)
                } else {
                    AudioError::Device(message)
                }
            }
            other => AudioError::Device(other.to_string()),
        }
    }

    /// Classifies a failure to query a device's default configuration.
    pub fn from_config_error(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::BackendSpecific { err } => {
                let message = err.description;
                if looks_like_permission_denial(&message) {
                    AudioError::Permission(message)
                } else {
                    AudioError::Device(message)
                }
            }
            other => AudioError::Device(other.to_string()),
        }
    }
}

fn looks_like_permission_denial(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["permission", "denied", "not authorized", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle))
}
