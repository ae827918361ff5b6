//! Error types for the delivery and cache subsystem.

use thiserror::Error;

/// Main error type for courier operations.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid storage format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Storage is locked by another process")]
    Locked,

    #[error("Invalid topic: {0:?}")]
    InvalidTopic(String),

    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Change stream error: {0}")]
    ChangeStream(String),

    #[error("Send was cancelled before completing")]
    SendCancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for CourierError {
    fn from(e: serde_json::Error) -> Self {
        CourierError::Serialization(e.to_string())
    }
}

impl From<regex::Error> for CourierError {
    fn from(e: regex::Error) -> Self {
        CourierError::InvalidPattern(e.to_string())
    }
}

/// Result type for courier operations.
pub type Result<T> = std::result::Result<T, CourierError>;
