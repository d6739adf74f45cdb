//! Error types for tracksync core.

use thiserror::Error;

/// Errors raised by the pure data model.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed member key: {0}")]
    MalformedMemberKey(String),

    #[error("empty environment id")]
    EmptyEnvironment,

    #[error("manifest encoding error: {0}")]
    ManifestEncoding(String),

    #[error("manifest decoding error: {0}")]
    ManifestDecoding(String),

    #[error("result decoding error: {0}")]
    ResultDecoding(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
