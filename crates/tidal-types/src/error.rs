//! Error types for the wire codec.

use thiserror::Error;

/// Errors raised while encoding or decoding a wire message.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to encode {kind} message: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode {kind} message: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown test type: {0}")]
    UnknownTestType(String),
}

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
