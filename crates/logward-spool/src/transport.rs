//! The connection a spool flushes through.

use crate::error::TransportError;

/// A line-oriented request/response connection to the collector.
///
/// Implementations own their socket timeouts. The spool writes one
/// newline-terminated payload and then reads exactly one response line.
pub trait Transport {
    /// Establishes the connection, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be reached.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Returns true while the connection is believed usable.
    fn is_connected(&self) -> bool;

    /// Closes the connection. Closing a closed transport is a no-op.
    fn close(&mut self);

    /// Writes all of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected or the write fails.
    fn send_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Reads up to the next `\n` and returns the line without it.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected, the read fails or times out, or
    /// the peer closes the connection before a full line arrives.
    fn read_line(&mut self) -> Result<String, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn send_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send_all(bytes)
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        (**self).read_line()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn send_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send_all(bytes)
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        (**self).read_line()
    }
}
