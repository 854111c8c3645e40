//! Per-source log collectors.
//!
//! Each collector owns a [`PositionedTailer`](logward_tail::PositionedTailer)
//! with its own state namespace and truncation policy:
//!
//! | Collector | Namespace | Policy |
//! |-----------|-----------|--------|
//! | [`AuditdCollector`] | `auditd` | reset to zero |
//! | [`SyslogCollector`] | `syslog` | reset to zero |
//! | [`AuthLogCollector`] | `auth.log` | reset to zero |
//! | [`BashHistoryCollector`] | `bash_history` | seek to end |

use std::time::Duration;

use crate::event::Event;

mod auditd;
mod auth;
mod bash_history;
mod syslog;

pub use auditd::AuditdCollector;
pub use auth::AuthLogCollector;
pub use bash_history::{BashHistoryCollector, expand_tilde};
pub use syslog::SyslogCollector;

/// A log source that turns new lines into events.
pub trait Collector {
    /// Returns the source's state namespace.
    fn name(&self) -> &'static str;

    /// Skips everything already in the file.
    fn start_from_end(&mut self);

    /// Reads new lines, waiting at most `timeout`, and appends the
    /// resulting events to `out`.
    fn poll(&mut self, timeout: Duration, out: &mut Vec<Event>);

    /// Emits anything held back for correlation. Called on shutdown.
    fn finish(&mut self, _out: &mut Vec<Event>) {}
}

/// Returns the first token of `line` if it looks like an ISO timestamp.
pub(crate) fn leading_iso_timestamp(line: &str) -> Option<&str> {
    let (token, _) = line.split_once(' ')?;
    let b = token.as_bytes();
    (b.len() >= 19 && b[4] == b'-' && b[7] == b'-' && b[10] == b'T').then_some(token)
}

/// Returns the text between the first `start` and the next `end` after it.
pub(crate) fn between<'a>(s: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = s.find(start)? + start.len();
    let len = s[from..].find(end)?;
    Some(&s[from..from + len])
}

/// Returns the text after the first `marker`.
pub(crate) fn after<'a>(s: &'a str, marker: &str) -> Option<&'a str> {
    s.find(marker).map(|idx| &s[idx + marker.len()..])
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}
