use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::DateTime;
use logward_tail::{PositionedTailer, TruncationPolicy};
use tracing::trace;

use super::Collector;
use crate::event::{Event, Severity};
use crate::normalize::{format_utc, normalize_event, now_iso, sanitize_raw};

const NAMESPACE: &str = "auditd";

/// How long records sharing a serial wait for their siblings.
pub const MERGE_WINDOW: Duration = Duration::from_secs(2);

const AUDIT_PREFIX: &str = "msg=audit(";

/// Collector for `/var/log/audit/audit.log`.
///
/// The kernel writes one logical event as several records sharing a serial
/// in `msg=audit(<secs>.<ms>:<serial>)`. `AVC`, `SYSCALL` and `PROCTITLE`
/// records are held back and merged into a single event once a `SYSCALL`
/// and at least one of the others have arrived, or once the group is older
/// than [`MERGE_WINDOW`]. Every other record becomes an event on its own.
#[derive(Debug)]
pub struct AuditdCollector {
    hostname: String,
    tail: PositionedTailer,
    pending: HashMap<u64, Pending>,
}

#[derive(Debug)]
struct Pending {
    first_seen: Instant,
    timestamp: Option<String>,
    avc: Option<String>,
    syscall: Option<String>,
    proctitle: Option<String>,
}

impl Pending {
    const fn new(now: Instant) -> Self {
        Self {
            first_seen: now,
            timestamp: None,
            avc: None,
            syscall: None,
            proctitle: None,
        }
    }

    const fn is_complete(&self) -> bool {
        self.syscall.is_some() && (self.avc.is_some() || self.proctitle.is_some())
    }
}

impl AuditdCollector {
    /// Creates a collector tailing `path`.
    pub fn new(
        path: impl Into<PathBuf>,
        hostname: impl Into<String>,
        state_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            tail: PositionedTailer::new(path, NAMESPACE, state_path, TruncationPolicy::ResetToZero),
            pending: HashMap::new(),
        }
    }

    /// Returns the number of serials waiting for more records.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feeds one line, pushing any event it completes to `out`.
    pub fn process_line(&mut self, line: &str, now: Instant, out: &mut Vec<Event>) {
        if line.is_empty() {
            return;
        }
        let Some(serial) = audit_serial(line) else {
            out.push(parse_single(&self.hostname, line));
            return;
        };

        let record_type = find_value(line, "type").unwrap_or_default();
        if !matches!(record_type, "AVC" | "SYSCALL" | "PROCTITLE") {
            out.push(parse_single(&self.hostname, line));
            return;
        }

        let group = self
            .pending
            .entry(serial)
            .or_insert_with(|| Pending::new(now));
        if group.timestamp.is_none() {
            group.timestamp = audit_timestamp(line);
        }
        let slot = match record_type {
            "AVC" => &mut group.avc,
            "SYSCALL" => &mut group.syscall,
            _ => &mut group.proctitle,
        };
        slot.get_or_insert_with(|| line.to_string());

        if group.is_complete() {
            if let Some(group) = self.pending.remove(&serial) {
                trace!(serial, "merged audit records");
                out.push(merge(&self.hostname, &group));
            }
        }
    }

    /// Emits groups older than [`MERGE_WINDOW`] as they are.
    pub fn flush_expired(&mut self, now: Instant, out: &mut Vec<Event>) {
        let mut expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, g)| now.saturating_duration_since(g.first_seen) > MERGE_WINDOW)
            .map(|(serial, _)| *serial)
            .collect();
        expired.sort_unstable();
        self.emit(&expired, out);
    }

    fn emit(&mut self, serials: &[u64], out: &mut Vec<Event>) {
        for serial in serials {
            if let Some(group) = self.pending.remove(serial) {
                out.push(merge(&self.hostname, &group));
            }
        }
    }
}

impl Collector for AuditdCollector {
    fn name(&self) -> &'static str {
        NAMESPACE
    }

    fn start_from_end(&mut self) {
        self.tail.start_from_end();
    }

    fn poll(&mut self, timeout: Duration, out: &mut Vec<Event>) {
        let lines = self.tail.read_new_lines(timeout);
        let now = Instant::now();
        self.flush_expired(now, out);
        for line in &lines {
            self.process_line(line, now, out);
        }
    }

    fn finish(&mut self, out: &mut Vec<Event>) {
        let mut serials: Vec<u64> = self.pending.keys().copied().collect();
        serials.sort_unstable();
        self.emit(&serials, out);
    }
}

/// Turns a record that is not merged into an event.
fn parse_single(hostname: &str, line: &str) -> Event {
    let record_type = find_value(line, "type").unwrap_or("AUDIT");
    let comm = find_value(line, "comm");
    let exe = find_value(line, "exe");
    let proctitle = find_value(line, "proctitle");

    let user = find_value(line, "acct")
        .map(str::to_string)
        .or_else(|| find_value(line, "auid").map(|v| format!("auid:{v}")))
        .or_else(|| find_value(line, "uid").map(|v| format!("uid:{v}")))
        .unwrap_or_default();

    let denied = line.contains("DENIED") || line.contains("success=no");
    let failed = find_value(line, "res") == Some("failed")
        || find_value(line, "exit").is_some_and(|v| v.starts_with('-'));
    let severity = if denied || failed {
        Severity::High
    } else if matches!(record_type, "USER_LOGIN" | "USER_AUTH" | "SYSCALL" | "EXECVE") {
        Severity::Medium
    } else {
        Severity::Low
    };

    let mut e = Event {
        timestamp: audit_timestamp(line).unwrap_or_else(now_iso),
        hostname: hostname.to_string(),
        source: NAMESPACE.to_string(),
        event_type: record_type.to_string(),
        severity,
        process: comm.or(exe).unwrap_or_default().to_string(),
        user,
        command: exe.or(proctitle).or(comm).unwrap_or_default().to_string(),
        raw_log: sanitize_raw(line),
        ..Default::default()
    };

    if record_type == "PROCTITLE" {
        if let Some(title) = proctitle {
            e.command = title.to_string();
        }
        if e.process.is_empty() {
            e.process = "auditd".to_string();
        }
    }

    normalize_event(&mut e);
    e
}

fn merge(hostname: &str, group: &Pending) -> Event {
    let syscall = group.syscall.as_deref();
    let from_syscall = |key: &str| syscall.and_then(|l| find_value(l, key));

    let comm = group
        .avc
        .as_deref()
        .and_then(|l| find_value(l, "comm"))
        .or_else(|| from_syscall("comm"));
    let exe = from_syscall("exe");
    let proctitle = group
        .proctitle
        .as_deref()
        .and_then(|l| find_value(l, "proctitle"));

    let user = from_syscall("auid")
        .map(|v| format!("auid:{v}"))
        .or_else(|| from_syscall("uid").map(|v| format!("uid:{v}")))
        .unwrap_or_default();

    let denied = group.avc.is_some()
        || from_syscall("success") == Some("no")
        || from_syscall("exit").is_some_and(|v| v.starts_with('-'));
    let (event_type, severity) = if denied {
        ("DENIED", Severity::High)
    } else if syscall.is_some() {
        ("SYSCALL", Severity::Medium)
    } else {
        ("AUDIT", Severity::Low)
    };

    let raw: Vec<&str> = [&group.avc, &group.syscall, &group.proctitle]
        .into_iter()
        .filter_map(Option::as_deref)
        .collect();
    let raw = if raw.is_empty() {
        "(merged audit event)".to_string()
    } else {
        raw.join(" | ")
    };

    let mut e = Event {
        timestamp: group.timestamp.clone().unwrap_or_else(now_iso),
        hostname: hostname.to_string(),
        source: NAMESPACE.to_string(),
        event_type: event_type.to_string(),
        severity,
        process: comm.or(exe).unwrap_or_default().to_string(),
        user,
        command: exe.or(proctitle).unwrap_or_default().to_string(),
        raw_log: sanitize_raw(&raw),
        ..Default::default()
    };
    normalize_event(&mut e);
    e
}

/// Returns the value of `key=` in an audit record.
///
/// The key must start the line or follow whitespace, so `uid` does not
/// match inside `auid=`. Quoted values run to the closing quote and are
/// returned without quotes; bare values run to the next whitespace and
/// lose any trailing quote left over from an enclosing `msg='...'`.
fn find_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let bytes = line.as_bytes();
    let mut from = 0;
    while let Some(found) = line[from..].find(key) {
        let start = from + found;
        let value_at = start + key.len();
        from = start + 1;

        let at_boundary = start == 0 || bytes[start - 1].is_ascii_whitespace();
        if !at_boundary || bytes.get(value_at) != Some(&b'=') {
            continue;
        }

        let rest = &line[value_at + 1..];
        let value = match rest.as_bytes().first() {
            Some(&q @ (b'"' | b'\'')) => {
                let inner = &rest[1..];
                &inner[..inner.find(char::from(q))?]
            }
            _ => rest
                .split(|c: char| c.is_ascii_whitespace())
                .next()
                .unwrap_or_default()
                .trim_end_matches(['\'', '"']),
        };
        return (!value.is_empty()).then_some(value);
    }
    None
}

/// Returns the `secs.ms:serial` text inside `msg=audit(...)`.
fn audit_stamp(line: &str) -> Option<&str> {
    let start = line.find(AUDIT_PREFIX)? + AUDIT_PREFIX.len();
    let len = line[start..].find(')')?;
    Some(&line[start..start + len])
}

fn audit_serial(line: &str) -> Option<u64> {
    let (_, serial) = audit_stamp(line)?.rsplit_once(':')?;
    serial.parse().ok()
}

/// Converts the record's epoch stamp to the normalized UTC format.
fn audit_timestamp(line: &str) -> Option<String> {
    let stamp = audit_stamp(line)?;
    let epoch = stamp.split(':').next().unwrap_or(stamp);
    let (secs, frac) = epoch.split_once('.').unwrap_or((epoch, ""));
    let secs: i64 = secs.parse().ok()?;

    let millis = frac
        .bytes()
        .take_while(u8::is_ascii_digit)
        .chain(std::iter::repeat(b'0'))
        .take(3)
        .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));

    DateTime::from_timestamp(secs, millis * 1_000_000).map(|dt| format_utc(&dt))
}
