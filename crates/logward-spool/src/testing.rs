//! Scripted in-memory transport for tests.
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for downstream crates.

use std::collections::VecDeque;
use std::io;

use crate::error::TransportError;
use crate::transport::Transport;

/// Canned acknowledgement line returned for [`Reply::Ack`].
pub const SUCCESS_RESPONSE: &str = r#"{"status":"success"}"#;

/// How a [`MockTransport`] answers one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Accept the payload and answer with [`SUCCESS_RESPONSE`].
    Ack,
    /// Accept the payload and answer with this line.
    Reject(String),
    /// Fail the write and drop the connection.
    SendError,
    /// Accept the write, then fail the read.
    ReadError,
    /// Accept the write, then report the peer as gone.
    Disconnect,
}

/// A [`Transport`] that records what it is sent and plays back a script.
///
/// Replies are consumed one per send. Once the script runs out every send
/// is answered with the default reply, [`Reply::Ack`] unless changed.
#[derive(Debug)]
pub struct MockTransport {
    connected: bool,
    refuse_connect: bool,
    script: VecDeque<Reply>,
    default_reply: Reply,
    pending: Option<Reply>,
    frames: Vec<Vec<u8>>,
    sent: Vec<String>,
    connects: usize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a connected transport that acknowledges everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connected: true,
            refuse_connect: false,
            script: VecDeque::new(),
            default_reply: Reply::Ack,
            pending: None,
            frames: Vec::new(),
            sent: Vec::new(),
            connects: 0,
        }
    }

    /// Creates a transport that starts disconnected.
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::new()
        }
    }

    /// Queues replies for the next sends.
    #[must_use]
    pub fn with_replies(mut self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.script.extend(replies);
        self
    }

    /// Sets the reply used once the script is exhausted.
    #[must_use]
    pub fn with_default_reply(mut self, reply: Reply) -> Self {
        self.default_reply = reply;
        self
    }

    /// Makes every `connect` call fail.
    #[must_use]
    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    /// Appends one reply to the script.
    pub fn push_reply(&mut self, reply: Reply) {
        self.script.push_back(reply);
    }

    /// Returns every payload written, without its trailing newline.
    #[must_use]
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// Returns every frame written, byte for byte.
    #[must_use]
    pub fn raw_frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// Returns how many times `connect` succeeded.
    #[must_use]
    pub const fn connects(&self) -> usize {
        self.connects
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.refuse_connect {
            return Err(TransportError::Connect {
                addr: "mock".to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        self.connected = true;
        self.connects += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        self.connected = false;
        self.pending = None;
    }

    fn send_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let reply = self
            .script
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone());
        if reply == Reply::SendError {
            self.connected = false;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted send failure").into());
        }

        self.frames.push(bytes.to_vec());
        let text = String::from_utf8_lossy(bytes);
        self.sent
            .push(text.strip_suffix('\n').unwrap_or(text.as_ref()).to_string());
        self.pending = Some(reply);
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        match self.pending.take() {
            Some(Reply::Ack) => Ok(SUCCESS_RESPONSE.to_string()),
            Some(Reply::Reject(line)) => Ok(line),
            Some(Reply::ReadError) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "scripted read failure",
            )
            .into()),
            Some(Reply::Disconnect) | None => {
                self.connected = false;
                Err(TransportError::Closed)
            }
            Some(Reply::SendError) => Err(TransportError::Closed),
        }
    }
}
