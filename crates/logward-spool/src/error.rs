//! Error types for the delivery spool.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by spool storage operations.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// The spool directory could not be created or used.
    #[error("spool directory {} is unusable: {source}", .path.display())]
    DirectoryUnusable {
        /// The spool directory.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A payload contained a line break after trailing CR/LF were trimmed.
    #[error("payload contains an embedded line break")]
    EmbeddedNewline,

    /// An I/O error occurred on a spool file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An atomic replace of a spool file failed.
    #[error("persist error: {0}")]
    Persist(#[from] logward_persist::PersistError),
}

/// Errors raised by a [`Transport`](crate::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport is not connected.
    #[error("not connected")]
    NotConnected,

    /// Connecting to the remote endpoint failed.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// The endpoint address.
        addr: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// An I/O error occurred on the connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single send was not acknowledged.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Writing the payload or reading the response failed.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The collector answered without a success marker.
    #[error("collector rejected payload: {response}")]
    Rejected {
        /// The response line as received.
        response: String,
    },
}

/// Result type alias for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spool_error_display() {
        let err = SpoolError::DirectoryUnusable {
            path: PathBuf::from("/data/spool"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "spool directory /data/spool is unusable: denied");

        assert_eq!(
            SpoolError::EmbeddedNewline.to_string(),
            "payload contains an embedded line break"
        );
    }

    #[test]
    fn transport_error_display() {
        assert_eq!(TransportError::NotConnected.to_string(), "not connected");
        assert_eq!(TransportError::Closed.to_string(), "connection closed by peer");

        let err = TransportError::Connect {
            addr: "127.0.0.1:5000".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(err.to_string(), "connect to 127.0.0.1:5000 failed: refused");
    }

    #[test]
    fn delivery_error_display() {
        let err = DeliveryError::Rejected {
            response: r#"{"status":"error"}"#.to_string(),
        };
        assert_eq!(
            err.to_string(),
            r#"collector rejected payload: {"status":"error"}"#
        );

        let err: DeliveryError = TransportError::Closed.into();
        assert_eq!(err.to_string(), "transport failure: connection closed by peer");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SpoolError>();
        assert_send_sync::<TransportError>();
        assert_send_sync::<DeliveryError>();
    }
}
