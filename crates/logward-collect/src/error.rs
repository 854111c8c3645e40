//! Error types for event collection.

use thiserror::Error;

/// Errors that can occur while collecting and encoding events.
#[derive(Debug, Error)]
pub enum CollectError {
    /// A severity name was not one of `low`, `medium` or `high`.
    #[error("invalid severity: {0}")]
    InvalidSeverity(String),

    /// A batch could not be encoded as JSON.
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type alias for collection operations.
pub type Result<T> = std::result::Result<T, CollectError>;
