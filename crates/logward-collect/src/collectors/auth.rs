use std::path::PathBuf;
use std::time::Duration;

use logward_tail::{PositionedTailer, TruncationPolicy};

use super::{Collector, after, between, leading_iso_timestamp};
use crate::event::{Event, Severity};
use crate::normalize::{normalize_event, now_iso, sanitize_raw};

const NAMESPACE: &str = "auth.log";

const SESSION_OPENED: &str = "pam_unix(sudo:session): session opened for user ";
const SESSION_CLOSED: &str = "session closed for user ";

/// Collector for `/var/log/auth.log`.
///
/// Recognizes sudo commands and sessions and failed SSH passwords. Other
/// lines pass through as `auth_raw`.
#[derive(Debug)]
pub struct AuthLogCollector {
    hostname: String,
    tail: PositionedTailer,
}

impl AuthLogCollector {
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

    /// Parses one auth.log line.
    #[must_use]
    pub fn parse_line(hostname: &str, line: &str) -> Event {
        let mut e = Event {
            timestamp: leading_iso_timestamp(line).map_or_else(now_iso, str::to_string),
            hostname: hostname.to_string(),
            source: NAMESPACE.to_string(),
            event_type: "auth_raw".to_string(),
            severity: Severity::Low,
            raw_log: sanitize_raw(line),
            ..Default::default()
        };

        if line.contains(" sudo: ") {
            parse_sudo(line, &mut e);
        } else if line.contains("Failed password") && line.contains(" from ") {
            e.event_type = "ssh_fail".to_string();
            e.severity = Severity::High;
            e.process = "sshd".to_string();
            let user = if line.contains("for invalid user ") {
                between(line, "for invalid user ", " from ")
            } else {
                between(line, "for ", " from ")
            };
            e.user = user.unwrap_or_default().to_string();
            e.ip = between(line, " from ", " port ")
                .or_else(|| between(line, " from ", " "))
                .unwrap_or_default()
                .to_string();
        }

        normalize_event(&mut e);
        e
    }
}

fn parse_sudo(line: &str, e: &mut Event) {
    e.process = "sudo".to_string();

    if line.contains(SESSION_OPENED) {
        e.event_type = "user_login".to_string();
        e.severity = Severity::Medium;
        e.process = "pam_unix".to_string();
        let by = between(line, " by ", "(").or_else(|| {
            after(line, " by ").map(|rest| rest.split('(').next().unwrap_or(rest).trim_end())
        });
        e.user = by.unwrap_or_default().to_string();
    } else if line.contains(SESSION_CLOSED) {
        e.event_type = "sudo_session_close".to_string();
        e.process = "pam_unix".to_string();
    } else {
        e.event_type = "sudo".to_string();
        e.severity = Severity::Medium;
        e.user = between(line, " sudo: ", " :")
            .or_else(|| after(line, "sudo: "))
            .unwrap_or_default()
            .trim()
            .to_string();
        e.command = after(line, " COMMAND=").unwrap_or_default().to_string();
    }
}

impl Collector for AuthLogCollector {
    fn name(&self) -> &'static str {
        NAMESPACE
    }

    fn start_from_end(&mut self) {
        self.tail.start_from_end();
    }

    fn poll(&mut self, timeout: Duration, out: &mut Vec<Event>) {
        out.extend(
            self.tail
                .read_new_lines(timeout)
                .iter()
                .map(|line| Self::parse_line(&self.hostname, line)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use test_case::test_case;

    const TS: &str = "2024-03-05T10:20:30.000+00:00";

    fn parse(rest: &str) -> Event {
        AuthLogCollector::parse_line("web-1", &format!("{TS} web-1 {rest}"))
    }

    #[test]
    fn sudo_command() {
        let e = parse(
            "sudo:    alice : TTY=pts/0 ; PWD=/home/alice ; USER=root ; COMMAND=/usr/bin/apt update",
        );
        assert_eq!(e.event_type, "sudo");
        assert_eq!(e.severity, Severity::Medium);
        assert_eq!(e.process, "sudo");
        assert_eq!(e.user, "alice");
        assert_eq!(e.command, "/usr/bin/apt update");
        assert_eq!(e.timestamp, "2024-03-05T10:20:30.000Z");
    }

    #[test]
    fn sudo_session_opened() {
        let e = parse(
            "sudo: pam_unix(sudo:session): session opened for user root(uid=0) by alice(uid=1000)",
        );
        assert_eq!(e.event_type, "user_login");
        assert_eq!(e.severity, Severity::Medium);
        assert_eq!(e.process, "pam_unix");
        assert_eq!(e.user, "alice");
    }

    #[test]
    fn sudo_session_opened_without_uid() {
        let e = parse("sudo: pam_unix(sudo:session): session opened for user root by alice ");
        assert_eq!(e.user, "alice");
    }

    #[test]
    fn sudo_session_closed() {
        let e = parse("sudo: pam_unix(sudo:session): session closed for user root");
        assert_eq!(e.event_type, "sudo_session_close");
        assert_eq!(e.severity, Severity::Low);
        assert_eq!(e.process, "pam_unix");
    }

    #[test_case(
        "sshd[4242]: Failed password for bob from 203.0.113.9 port 52214 ssh2",
        "bob",
        "203.0.113.9" ;
        "known user"
    )]
    #[test_case(
        "sshd[4242]: Failed password for invalid user admin from 198.51.100.7 port 40000 ssh2",
        "admin",
        "198.51.100.7" ;
        "invalid user"
    )]
    fn ssh_failures(rest: &str, user: &str, ip: &str) {
        let e = parse(rest);
        assert_eq!(e.event_type, "ssh_fail");
        assert_eq!(e.severity, Severity::High);
        assert_eq!(e.process, "sshd");
        assert_eq!(e.user, user);
        assert_eq!(e.ip, ip);
    }

    #[test]
    fn other_lines_are_raw() {
        let e = parse("sshd[1]: Accepted publickey for bob from 10.0.0.1 port 22 ssh2");
        assert_eq!(e.event_type, "auth_raw");
        assert_eq!(e.severity, Severity::Low);
        assert!(e.process.is_empty());
    }

    #[test]
    fn blank_lines_reach_the_filter() {
        let dir = TempDir::new().expect("create temp dir");
        let log = dir.path().join("auth.log");
        fs::write(&log, "\n").expect("write");
        let mut collector = AuthLogCollector::new(&log, "web-1", dir.path().join("reader.state"));

        let mut out = Vec::new();
        collector.poll(Duration::from_millis(20), &mut out);

        assert_eq!(out.len(), 1);
        assert!(out[0].raw_log.is_empty());
        assert_eq!(out[0].source, "auth.log");
    }
}
