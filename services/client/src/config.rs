use shoplive_audio::{CaptureConfig, PlaybackConfig, VadConfig};
use shoplive_realtime::{Endpoint, Mode};
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Host of the staging deployment.
pub const STAGE_HOST: &str = "stage0327---shop-web-nhhfh7g7iq-uc.a.run.app";

/// Which deployment the client talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Prod,
    Stage,
}

impl Target {
    /// The target this binary was built for (`--features prod`).
    pub fn build_default() -> Self {
        if cfg!(feature = "prod") {
            Target::Prod
        } else {
            Target::Stage
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub target: Target,
    pub host: String,
    pub mode: Mode,
    /// Substring of the microphone to prefer; `None` uses the system default.
    pub preferred_mic: Option<String>,
    pub vad_threshold: f32,
    pub vad_hangover: Duration,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_host(None)
    }

    /// Like [`from_env`](Self::from_env), with a host given on the command line
    /// taking precedence over `SHOPLIVE_HOST`.
    pub fn from_env_with_host(host_override: Option<String>) -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let target = match std::env::var("SHOPLIVE_TARGET") {
            Ok(value) => match value.to_lowercase().as_str() {
                "prod" => Target::Prod,
                "stage" => Target::Stage,
                _ => {
                    return Err(ConfigError::InvalidValue(
                        "SHOPLIVE_TARGET".to_string(),
                        format!("'{}' is not a target (prod|stage)", value),
                    ));
                }
            },
            Err(_) => Target::build_default(),
        };

        let host = match host_override.or_else(|| std::env::var("SHOPLIVE_HOST").ok()) {
            Some(host) => host,
            None => match target {
                Target::Stage => STAGE_HOST.to_string(),
                Target::Prod => {
                    return Err(ConfigError::MissingVar(
                        "SHOPLIVE_HOST must be set for the 'prod' target".to_string(),
                    ));
                }
            },
        };

        let mode_str = std::env::var("SHOPLIVE_MODE").unwrap_or_else(|_| "text".to_string());
        let mode = mode_str
            .parse::<Mode>()
            .map_err(|e| ConfigError::InvalidValue("SHOPLIVE_MODE".to_string(), e))?;

        let preferred_mic = match std::env::var("SHOPLIVE_PREFERRED_MIC") {
            Ok(name) if name.trim().is_empty() => None,
            Ok(name) => Some(name),
            Err(_) => Some(shoplive_audio::capture::DEFAULT_PREFERRED_DEVICE.to_string()),
        };

        let vad_threshold = match std::env::var("SHOPLIVE_VAD_THRESHOLD") {
            Ok(value) => value.parse::<f32>().map_err(|e| {
                ConfigError::InvalidValue("SHOPLIVE_VAD_THRESHOLD".to_string(), e.to_string())
            })?,
            Err(_) => shoplive_audio::vad::DEFAULT_ENERGY_THRESHOLD,
        };

        let vad_hangover = match std::env::var("SHOPLIVE_VAD_HANGOVER_MS") {
            Ok(value) => Duration::from_millis(value.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("SHOPLIVE_VAD_HANGOVER_MS".to_string(), e.to_string())
            })?),
            Err(_) => shoplive_audio::vad::DEFAULT_HANGOVER,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            target,
            host,
            mode,
            preferred_mic,
            vad_threshold,
            vad_hangover,
            log_level,
        })
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.mode)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            preferred_device: self.preferred_mic.clone(),
            vad: VadConfig {
                energy_threshold: self.vad_threshold,
                hangover: self.vad_hangover,
            },
            ..CaptureConfig::default()
        }
    }

    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig::default()
    }
}
