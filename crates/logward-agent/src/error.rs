//! Error types for the agent.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop the agent from starting or a command from running.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The configuration could not be read, parsed or validated.
    #[error("configuration error: {0}")]
    Config(String),

    /// A data directory could not be created.
    #[error("cannot create directory {}: {source}", .path.display())]
    DataDir {
        /// The directory.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The logging subscriber could not be installed.
    #[error("logging setup failed: {0}")]
    Logging(String),

    /// A spool operation failed.
    #[error("spool error: {0}")]
    Spool(#[from] logward_spool::SpoolError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
