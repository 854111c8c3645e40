//! # logward-collect
//!
//! Turns security-relevant log lines into batched collector payloads.
//!
//! This crate provides:
//!
//! - [`Event`] and [`Severity`]: The normalized event model
//! - [`normalize`]: Timestamp and raw-text normalization
//! - [`EventFilter`]: Severity, substring, dedupe and rate-limit filtering
//! - [`Batcher`]: Groups events into JSON insert payload lines
//! - [`collectors`]: Tailing parsers for auditd, syslog, auth.log and shell
//!   history
//!
//! The payload lines produced here are what the delivery spool carries.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod collectors;
pub mod error;
pub mod event;
pub mod filter;
pub mod normalize;
pub mod payload;

pub use collectors::{
    AuditdCollector, AuthLogCollector, BashHistoryCollector, Collector, SyslogCollector,
    expand_tilde,
};
pub use error::{CollectError, Result};
pub use event::{Event, Severity};
pub use filter::{EventFilter, FilterConfig};
pub use payload::{Batcher, encode_batch};
