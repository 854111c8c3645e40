use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use logward_tail::{PositionedTailer, TruncationPolicy};
use tracing::debug;

use super::Collector;
use crate::event::{Event, Severity};
use crate::normalize::{normalize_event, now_iso, sanitize_raw};

const NAMESPACE: &str = "bash_history";
const PASSWD: &str = "/etc/passwd";

/// Collector for a shell history file.
///
/// History files are rewritten wholesale by the shell, so a shrunk or
/// replaced file resumes at its end instead of replaying old commands.
#[derive(Debug)]
pub struct BashHistoryCollector {
    hostname: String,
    tail: PositionedTailer,
}

impl BashHistoryCollector {
    /// Creates a collector tailing `path`. A leading `~` is expanded with
    /// [`expand_tilde`].
    pub fn new(path: &str, hostname: impl Into<String>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            hostname: hostname.into(),
            tail: PositionedTailer::new(
                expand_tilde(path),
                NAMESPACE,
                state_path,
                TruncationPolicy::SeekToEnd,
            ),
        }
    }

    /// Returns the expanded history path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.tail.path()
    }

    /// Turns one history line into a `command_history` event.
    #[must_use]
    pub fn parse_line(hostname: &str, line: &str) -> Event {
        let mut e = Event {
            timestamp: now_iso(),
            hostname: hostname.to_string(),
            source: NAMESPACE.to_string(),
            event_type: "command_history".to_string(),
            severity: Severity::Low,
            process: "bash".to_string(),
            command: line.to_string(),
            raw_log: sanitize_raw(line),
            ..Default::default()
        };
        normalize_event(&mut e);
        e
    }
}

impl Collector for BashHistoryCollector {
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

/// Expands a leading `~` to the invoking user's home directory.
///
/// Under sudo the home of `SUDO_USER` is used, so the agent follows the
/// history of the person who started it rather than root's.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    if !path.starts_with('~') {
        return PathBuf::from(path);
    }
    let base = std::env::var("SUDO_USER")
        .ok()
        .filter(|user| !user.is_empty())
        .and_then(|user| sudo_user_home(&user))
        .or_else(dirs::home_dir);
    expand_with(path, base.as_deref())
}

fn sudo_user_home(user: &str) -> Option<PathBuf> {
    let passwd = fs::read_to_string(PASSWD)
        .inspect_err(|e| debug!(error = %e, "cannot read {PASSWD}"))
        .ok()?;
    passwd_home(&passwd, user)
}

/// Finds `user`'s home in `/etc/passwd` content.
fn passwd_home(passwd: &str, user: &str) -> Option<PathBuf> {
    passwd.lines().find_map(|line| {
        let mut fields = line.split(':');
        if fields.next()? != user {
            return None;
        }
        let home = fields.nth(4)?;
        (!home.is_empty()).then(|| PathBuf::from(home))
    })
}

fn expand_with(path: &str, base: Option<&Path>) -> PathBuf {
    let Some(base) = base else {
        return PathBuf::from(path);
    };
    match path.strip_prefix('~') {
        Some("") => base.to_path_buf(),
        Some(rest) if rest.starts_with('/') => base.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    const PASSWD_SAMPLE: &str = "\
root:x:0:0:root:/root:/bin/bash
alice:x:1000:1000:Alice,,,:/home/alice:/bin/bash
nohome:x:1001:1001:::/bin/sh
";

    #[test_case("~", "/home/alice" ; "bare tilde")]
    #[test_case("~/.bash_history", "/home/alice/.bash_history" ; "tilde slash")]
    #[test_case("~bob/.bash_history", "~bob/.bash_history" ; "other user form unchanged")]
    #[test_case("/var/log/x", "/var/log/x" ; "absolute unchanged")]
    fn expands_against_base(input: &str, expected: &str) {
        assert_eq!(
            expand_with(input, Some(Path::new("/home/alice"))),
            PathBuf::from(expected)
        );
    }

    #[test]
    fn without_base_path_is_unchanged() {
        assert_eq!(expand_with("~/.x", None), PathBuf::from("~/.x"));
    }

    #[test]
    fn absolute_path_skips_lookup() {
        assert_eq!(expand_tilde("/tmp/h"), PathBuf::from("/tmp/h"));
    }

    #[test]
    fn finds_home_in_passwd() {
        assert_eq!(
            passwd_home(PASSWD_SAMPLE, "alice"),
            Some(PathBuf::from("/home/alice"))
        );
        assert_eq!(passwd_home(PASSWD_SAMPLE, "nohome"), None);
        assert_eq!(passwd_home(PASSWD_SAMPLE, "carol"), None);
    }

    #[test]
    fn parses_command_line() {
        let e = BashHistoryCollector::parse_line("web-1", "rm -rf \"/tmp/x\"");
        assert_eq!(e.source, "bash_history");
        assert_eq!(e.event_type, "command_history");
        assert_eq!(e.process, "bash");
        assert_eq!(e.command, "rm -rf \"/tmp/x\"");
        assert_eq!(e.raw_log, "rm -rf  /tmp/x");
    }

    #[test]
    fn existing_history_is_skipped_on_first_start() {
        let dir = TempDir::new().expect("create temp dir");
        let history = dir.path().join(".bash_history");
        fs::write(&history, "ls\n").expect("write");
        let path = history.to_string_lossy().into_owned();
        let mut collector = BashHistoryCollector::new(&path, "web-1", dir.path().join("state"));
        collector.start_from_end();

        let mut out = Vec::new();
        collector.poll(Duration::from_millis(20), &mut out);
        assert!(out.is_empty());

        fs::write(&history, "ls\npwd\n\n").expect("append");
        collector.poll(Duration::from_millis(20), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].command, "pwd");
    }
}
