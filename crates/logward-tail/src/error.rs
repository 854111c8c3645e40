//! Error types for file tailing.

use thiserror::Error;

/// Errors that can occur while tailing a file.
///
/// None of these are fatal to a tailer: read errors turn into an empty
/// poll, and position persistence errors are logged and ignored.
#[derive(Debug, Error)]
pub enum TailError {
    /// An I/O error occurred on the tailed file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The position could not be persisted or loaded.
    #[error("state file error: {0}")]
    State(#[from] logward_persist::PersistError),

    /// The file-change watcher could not be set up.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Result type alias for tailing operations.
pub type Result<T> = std::result::Result<T, TailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err: TailError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.to_string(), "I/O error: gone");

        let err: TailError = logward_persist::PersistError::InvalidKey("k=".to_string()).into();
        assert!(err.to_string().starts_with("state file error"));
    }

    #[test]
    fn error_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<TailError>();
    }
}
