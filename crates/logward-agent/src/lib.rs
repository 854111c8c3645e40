//! # logward-agent
//!
//! Host telemetry agent. Tails security-relevant logs, turns new lines into
//! batched insert payloads and delivers them to a TCP collector with
//! at-least-once semantics.
//!
//! This crate provides:
//!
//! - [`AgentConfig`]: TOML configuration with defaults and validation
//! - [`Agent`]: The single-threaded collect, spool and flush loop
//! - [`TcpTransport`]: Blocking line-oriented connection to the collector
//! - [`logging`]: Subscriber setup from the `[logging]` section

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agent;
pub mod config;
pub mod error;
pub mod logging;
pub mod transport;

pub use agent::{Agent, StartOptions, TickReport};
pub use config::{AgentConfig, LogFormat, SourceKind};
pub use error::{AgentError, Result};
pub use transport::TcpTransport;
