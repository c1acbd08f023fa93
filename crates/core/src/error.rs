//! Error types shared by the codec and envelope layers.

use thiserror::Error;

/// Failures of the stateless conversions in [`crate::codec`].
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("PCM payload has odd length {0}, expected pairs of bytes")]
    OddPcmLength(usize),
}

/// An inbound frame that could not be turned into an envelope.
///
/// The transport logs and drops these; they never reach subscribers.
#[derive(Debug, Error)]
pub enum MalformedMessageError {
    #[error("frame is not valid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("`{mime_type}` envelope carries a non-string `data` field")]
    NonStringData { mime_type: String },
    #[error("command envelope is missing the `command` name")]
    MissingCommandName,
}
