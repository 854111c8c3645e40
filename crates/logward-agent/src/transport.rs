//! TCP connection to the collector.
//!
//! The spool drives delivery through the synchronous [`Transport`] trait.
//! [`TcpTransport`] implements it on top of `tokio::net::TcpStream`,
//! bridging each call with `block_in_place` and the runtime handle it was
//! created with. This requires a multi-threaded tokio runtime.

use std::future::Future;
use std::io::{self, ErrorKind};
use std::time::Duration;

use logward_spool::{Transport, TransportError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::ServerConfig;

/// Line-oriented TCP transport.
///
/// Connect, read and write each use the same timeout. Any I/O failure
/// closes the socket, so the control loop sees `is_connected() == false`
/// and reconnects on its next tick.
#[derive(Debug)]
pub struct TcpTransport {
    addr: String,
    timeout: Duration,
    runtime: Handle,
    stream: Option<BufReader<TcpStream>>,
}

impl TcpTransport {
    /// Creates a disconnected transport for `addr` (`host:port`) whose I/O
    /// runs on `runtime`.
    pub fn new(addr: impl Into<String>, timeout: Duration, runtime: Handle) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            runtime,
            stream: None,
        }
    }

    /// Creates a disconnected transport from the `[server]` section.
    #[must_use]
    pub fn from_config(config: &ServerConfig, runtime: Handle) -> Self {
        Self::new(config.address(), config.timeout(), runtime)
    }

    /// Returns the collector address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        tokio::task::block_in_place(|| self.runtime.block_on(fut))
    }

    async fn open(addr: &str, limit: Duration) -> io::Result<TcpStream> {
        let stream = timeout(limit, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(ErrorKind::TimedOut, "connection timed out"))??;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(addr, error = %e, "failed to set TCP_NODELAY");
        }
        Ok(stream)
    }

    fn fail(&mut self, err: io::Error) -> TransportError {
        debug!(addr = %self.addr, error = %err, "closing connection after I/O error");
        self.close();
        TransportError::Io(err)
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.close();
        let stream = self
            .block_on(Self::open(&self.addr, self.timeout))
            .map_err(|source| TransportError::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        info!(addr = %self.addr, "connected to collector");
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!(addr = %self.addr, "connection closed");
        }
    }

    fn send_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let limit = self.timeout;
        let Some(mut reader) = self.stream.take() else {
            return Err(TransportError::NotConnected);
        };
        let written = self.block_on(async {
            let stream = reader.get_mut();
            timeout(limit, async {
                stream.write_all(bytes).await?;
                stream.flush().await
            })
            .await
            .map_err(|_| io::Error::new(ErrorKind::TimedOut, "write timed out"))?
        });
        self.stream = Some(reader);
        written.map_err(|e| self.fail(e))
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let limit = self.timeout;
        let Some(mut reader) = self.stream.take() else {
            return Err(TransportError::NotConnected);
        };
        let mut buf = Vec::new();
        let read = self.block_on(async {
            timeout(limit, reader.read_until(b'\n', &mut buf))
                .await
                .map_err(|_| io::Error::new(ErrorKind::TimedOut, "read timed out"))?
        });
        self.stream = Some(reader);

        match read {
            Ok(_) if buf.last() == Some(&b'\n') => {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                Ok(String::from_utf8_lossy(&buf).into_owned())
            }
            Ok(_) => {
                self.close();
                Err(TransportError::Closed)
            }
            Err(e) => Err(self.fail(e)),
        }
    }
}
