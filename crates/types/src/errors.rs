//! Error types for record construction and decoding

use thiserror::Error;

/// Errors raised while turning raw frames into records
#[derive(Error, Debug)]
pub enum RecordError {
    /// Decoded JSON was not a key/value object
    #[error("record must be a JSON object, got {kind}")]
    NotAnObject { kind: &'static str },

    /// Malformed JSON input
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for record operations
pub type Result<T> = std::result::Result<T, RecordError>;
