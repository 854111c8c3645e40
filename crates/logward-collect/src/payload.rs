//! Batch payload encoding.
//!
//! One payload line carries one insert request for the collector:
//!
//! ```text
//! {"database":"mydb","operation":"insert","data":[{...},{...}],"query":{}}
//! ```

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::event::{Event, Severity};

#[derive(Serialize)]
struct InsertRequest<'a> {
    database: &'a str,
    operation: &'static str,
    data: Vec<Record<'a>>,
    query: Map<String, Value>,
}

#[derive(Serialize)]
struct Record<'a> {
    agent_id: &'a str,
    timestamp: &'a str,
    hostname: &'a str,
    source: &'a str,
    event_type: &'a str,
    severity: Severity,
    raw_log: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    user: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    process: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    command: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    ip: &'a str,
}

impl<'a> Record<'a> {
    fn new(agent_id: &'a str, e: &'a Event) -> Self {
        Self {
            agent_id,
            timestamp: &e.timestamp,
            hostname: &e.hostname,
            source: &e.source,
            event_type: &e.event_type,
            severity: e.severity,
            raw_log: &e.raw_log,
            user: &e.user,
            process: &e.process,
            command: &e.command,
            ip: &e.ip,
        }
    }
}

/// Encodes `events` as one single-line insert request.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn encode_batch(database: &str, agent_id: &str, events: &[Event]) -> Result<String> {
    let request = InsertRequest {
        database,
        operation: "insert",
        data: events.iter().map(|e| Record::new(agent_id, e)).collect(),
        query: Map::new(),
    };
    Ok(serde_json::to_string(&request)?)
}

/// Collects filtered events and cuts them into payload lines.
///
/// A payload is emitted as soon as `batch_size` events are waiting. Once
/// `interval` has passed since the last interval flush, the remainder is
/// emitted too, in chunks of at most `batch_size`.
#[derive(Debug)]
pub struct Batcher {
    database: String,
    agent_id: String,
    batch_size: usize,
    interval: Duration,
    pending: Vec<Event>,
    last_flush: Instant,
}

impl Batcher {
    /// Creates a batcher. A `batch_size` of zero is treated as one.
    #[must_use]
    pub fn new(
        database: impl Into<String>,
        agent_id: impl Into<String>,
        batch_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            database: database.into(),
            agent_id: agent_id.into(),
            batch_size: batch_size.max(1),
            interval,
            pending: Vec::new(),
            last_flush: Instant::now(),
        }
    }

    /// Queues one event.
    pub fn push(&mut self, event: Event) {
        self.pending.push(event);
    }

    /// Returns the number of queued events.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if the interval flush is due at `now`.
    #[must_use]
    pub fn flush_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_flush) >= self.interval
    }

    /// Returns the payloads ready at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails; the events stay queued.
    pub fn take_ready(&mut self, now: Instant) -> Result<Vec<String>> {
        let mut payloads = Vec::new();
        while self.pending.len() >= self.batch_size {
            payloads.push(self.encode_front(self.batch_size)?);
        }
        if self.flush_due(now) {
            payloads.extend(self.take_all()?);
            self.last_flush = now;
        }
        Ok(payloads)
    }

    /// Returns every queued event as payloads, regardless of the interval.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails; unencoded events stay queued.
    pub fn take_all(&mut self) -> Result<Vec<String>> {
        let mut payloads = Vec::new();
        while !self.pending.is_empty() {
            let count = self.pending.len().min(self.batch_size);
            payloads.push(self.encode_front(count)?);
        }
        Ok(payloads)
    }

    fn encode_front(&mut self, count: usize) -> Result<String> {
        let payload = encode_batch(&self.database, &self.agent_id, &self.pending[..count])?;
        self.pending.drain(..count);
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: usize) -> Event {
        Event {
            timestamp: "2024-03-05T10:20:30.000Z".to_string(),
            hostname: "web-1".to_string(),
            source: "syslog".to_string(),
            event_type: "syslog_raw".to_string(),
            raw_log: format!("line {n}"),
            ..Default::default()
        }
    }

    fn data_len(payload: &str) -> usize {
        let v: Value = serde_json::from_str(payload).expect("valid json");
        v["data"].as_array().map_or(0, Vec::len)
    }

    #[test]
    fn encodes_insert_request() {
        let mut e = event(1);
        e.user = "alice".to_string();
        e.severity = Severity::High;

        let payload = encode_batch("mydb", "agent-7", &[e]).expect("encode");

        assert_eq!(
            payload,
            concat!(
                r#"{"database":"mydb","operation":"insert","data":[{"agent_id":"agent-7","#,
                r#""timestamp":"2024-03-05T10:20:30.000Z","hostname":"web-1","source":"syslog","#,
                r#""event_type":"syslog_raw","severity":"high","raw_log":"line 1","user":"alice"}],"#,
                r#""query":{}}"#
            )
        );
    }

    #[test]
    fn payload_never_contains_raw_newline() {
        let mut e = event(1);
        e.command = "echo 'a\nb'\r".to_string();
        let payload = encode_batch("db", "id", &[e]).expect("encode");
        assert!(!payload.contains('\n'));
        assert!(!payload.contains('\r'));
    }

    #[test]
    fn full_batches_are_emitted_immediately() {
        let start = Instant::now();
        let mut batcher = Batcher::new("db", "id", 2, Duration::from_secs(60));
        for n in 0..5 {
            batcher.push(event(n));
        }

        let payloads = batcher.take_ready(start).expect("ready");

        assert_eq!(payloads.len(), 2);
        assert!(payloads.iter().all(|p| data_len(p) == 2));
        assert_eq!(batcher.pending_len(), 1);
    }

    #[test]
    fn remainder_waits_for_interval() {
        let start = Instant::now();
        let mut batcher = Batcher::new("db", "id", 3, Duration::from_secs(2));
        batcher.push(event(0));

        assert!(batcher.take_ready(start).expect("ready").is_empty());
        assert!(!batcher.flush_due(start + Duration::from_secs(1)));

        let later = start + Duration::from_secs(3);
        let payloads = batcher.take_ready(later).expect("ready");
        assert_eq!(payloads.len(), 1);
        assert_eq!(data_len(&payloads[0]), 1);
        assert!(!batcher.flush_due(later));
    }

    #[test]
    fn take_all_chunks_by_batch_size() {
        let mut batcher = Batcher::new("db", "id", 2, Duration::from_secs(60));
        for n in 0..3 {
            batcher.push(event(n));
        }

        let payloads = batcher.take_all().expect("all");

        assert_eq!(payloads.iter().map(|p| data_len(p)).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(batcher.pending_len(), 0);
    }

    #[test]
    fn zero_batch_size_means_one() {
        let mut batcher = Batcher::new("db", "id", 0, Duration::from_secs(60));
        batcher.push(event(0));
        batcher.push(event(1));
        assert_eq!(batcher.take_ready(Instant::now()).expect("ready").len(), 2);
    }
}
