//! Where the live session connects to.

use std::fmt;
use std::str::FromStr;

/// Streaming mode negotiated through the endpoint URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Text,
    Audio,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Text => "text",
            Mode::Audio => "audio",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Mode::Text),
            "audio" => Ok(Mode::Audio),
            other => Err(format!("'{}' is not a streaming mode (text|audio)", other)),
        }
    }
}

/// The `/live` websocket endpoint of one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: &'static str,
    host: String,
    mode: Mode,
}

impl Endpoint {
    /// A TLS endpoint (`wss://`).
    pub fn new(host: impl Into<String>, mode: Mode) -> Self {
        Self {
            scheme: "wss",
            host: host.into(),
            mode,
        }
    }

    /// A plaintext endpoint (`ws://`), for local servers.
    pub fn insecure(host: impl Into<String>, mode: Mode) -> Self {
        Self {
            scheme: "ws",
            ..Self::new(host, mode)
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn url(&self) -> String {
        format!("{}://{}/live?mode={}", self.scheme, self.host, self.mode)
    }
}
