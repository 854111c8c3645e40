//! Error types for file persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while persisting state to disk.
#[derive(Debug, Error)]
pub enum PersistError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The temp file could not be moved over the target, even after
    /// deleting the target first. The temp file has been removed.
    #[error("failed to replace {}: {}", .path.display(), .source)]
    Replace {
        /// The file that was meant to be replaced.
        path: PathBuf,
        /// The error from the final rename attempt.
        #[source]
        source: std::io::Error,
    },

    /// A state key cannot be stored in the line format.
    #[error("invalid state key: {0:?}")]
    InvalidKey(String),

    /// A state value cannot be stored in the line format.
    #[error("invalid value for state key {key}: {value:?}")]
    InvalidValue {
        /// The key being written.
        key: String,
        /// The rejected value.
        value: String,
    },
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistError>;
