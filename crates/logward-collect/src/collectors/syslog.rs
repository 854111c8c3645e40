use std::path::PathBuf;
use std::time::Duration;

use logward_tail::{PositionedTailer, TruncationPolicy};

use super::{Collector, contains_ignore_case, leading_iso_timestamp};
use crate::event::{Event, Severity};
use crate::normalize::{normalize_event, now_iso, sanitize_raw};

const NAMESPACE: &str = "syslog";

/// Tags that mark a line written by a user rather than a daemon.
const USER_TAGS: [&str; 3] = ["logger", "user", "test"];

/// Collector for RFC 5424-style `/var/log/syslog` lines:
/// `<timestamp> <host> <tag>[pid]: message`.
#[derive(Debug)]
pub struct SyslogCollector {
    hostname: String,
    tail: PositionedTailer,
}

impl SyslogCollector {
    /// Creates a collector tailing `path`.
    pub fn new(
        path: impl Into<PathBuf>,
        hostname: impl Into<String>,
        state_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            tail: PositionedTailer::new(path, NAMESPACE, state_path, TruncationPolicy::ResetToZero),
        }
    }

    /// Parses one syslog line.
    #[must_use]
    pub fn parse_line(hostname: &str, line: &str) -> Event {
        let header = Header::parse(line);
        let mut e = Event {
            timestamp: leading_iso_timestamp(line).map_or_else(now_iso, str::to_string),
            hostname: hostname.to_string(),
            source: NAMESPACE.to_string(),
            event_type: "syslog_raw".to_string(),
            severity: Severity::Low,
            process: header.ident.to_string(),
            command: header.message.to_string(),
            raw_log: sanitize_raw(line),
            ..Default::default()
        };

        if !header.ident.is_empty() {
            let ident = header.ident.to_ascii_lowercase();
            if ident == hostname.to_ascii_lowercase() || USER_TAGS.contains(&ident.as_str()) {
                e.process = "logger".to_string();
                e.user = header.ident.to_string();
                e.event_type = "user_log".to_string();
            }

            match ident.as_str() {
                "cron" => e.event_type = "cron_event".to_string(),
                "systemd" => e.event_type = "service_event".to_string(),
                "kernel" => {
                    e.event_type = "kernel_event".to_string();
                    e.severity = Severity::Medium;
                }
                _ => {}
            }
        }

        if contains_ignore_case(&e.raw_log, "denied")
            || contains_ignore_case(&e.raw_log, "success=no")
        {
            e.severity = Severity::High;
        } else if ["failed", "error", "warning"]
            .iter()
            .any(|w| contains_ignore_case(&e.raw_log, w))
        {
            e.severity = e.severity.max(Severity::Medium);
        }

        normalize_event(&mut e);
        e
    }
}

impl Collector for SyslogCollector {
    fn name(&self) -> &'static str {
        NAMESPACE
    }

    fn start_from_end(&mut self) {
        self.tail.start_from_end();
    }

    fn poll(&mut self, timeout: Duration, out: &mut Vec<Event>) {
        for line in self.tail.read_new_lines(timeout) {
            if !line.is_empty() {
                out.push(Self::parse_line(&self.hostname, &line));
            }
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Header<'a> {
    ident: &'a str,
    message: &'a str,
}

impl<'a> Header<'a> {
    fn parse(line: &'a str) -> Self {
        let mut parts = line.splitn(3, ' ');
        let (Some(_ts), Some(_host), Some(rest)) = (parts.next(), parts.next(), parts.next())
        else {
            return Self::default();
        };
        let Some((tag, message)) = rest.split_once(' ') else {
            return Self::default();
        };

        let tag = tag.strip_suffix(':').unwrap_or(tag);
        let message = message
            .strip_prefix(':')
            .map_or(message, |m| m.strip_prefix(' ').unwrap_or(m));

        let ident = tag.find('[').map_or(tag, |lb| &tag[..lb]);

        Self {
            ident: ident.trim(),
            message,
        }
    }
}
