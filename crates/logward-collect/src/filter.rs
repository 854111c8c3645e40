//! Event filtering.
//!
//! Checks run in a fixed order and the first decisive one wins:
//!
//! 1. drop events with an empty `raw_log` (if enabled)
//! 2. keep events whose raw text contains a `keep_if_raw_contains` needle,
//!    skipping every later check
//! 3. drop events below `min_severity`
//! 4. drop on `drop_event_types`, `drop_process_contains` or
//!    `drop_raw_contains` substrings
//! 5. drop a shell history command identical to the previous one (if
//!    enabled)
//! 6. rate limit per `(source, event_type, process, user, ip)`

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::event::{Event, Severity};

/// Rate-limit keys are pruned once the table grows past this size.
const RATE_TABLE_PRUNE_THRESHOLD: usize = 4096;

/// Filter settings, the `[filter]` section of the agent config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Events below this severity are dropped.
    pub min_severity: Severity,
    /// Drop events with an empty raw line.
    pub drop_empty_raw: bool,
    /// Minimum seconds between two events with the same key; 0 disables.
    pub rate_limit_window_secs: u64,
    /// Drop a shell history command repeated back to back.
    pub dedupe_bash_history: bool,
    /// Raw substrings that force an event through.
    pub keep_if_raw_contains: Vec<String>,
    /// Process substrings that drop an event.
    pub drop_process_contains: Vec<String>,
    /// Event type substrings that drop an event.
    pub drop_event_types: Vec<String>,
    /// Raw substrings that drop an event.
    pub drop_raw_contains: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_severity: Severity::Low,
            drop_empty_raw: true,
            rate_limit_window_secs: 0,
            dedupe_bash_history: false,
            keep_if_raw_contains: Vec::new(),
            drop_process_contains: Vec::new(),
            drop_event_types: Vec::new(),
            drop_raw_contains: Vec::new(),
        }
    }
}

/// Stateful event filter.
#[derive(Debug, Clone)]
pub struct EventFilter {
    config: FilterConfig,
    window: Duration,
    last_bash_command: Option<String>,
    last_seen: HashMap<String, Instant>,
}

impl EventFilter {
    /// Creates a filter.
    #[must_use]
    pub fn new(config: FilterConfig) -> Self {
        Self {
            window: Duration::from_secs(config.rate_limit_window_secs),
            config,
            last_bash_command: None,
            last_seen: HashMap::new(),
        }
    }

    /// Returns the filter settings.
    #[must_use]
    pub const fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Returns true if `event` should be forwarded.
    pub fn allow(&mut self, event: &Event) -> bool {
        self.allow_at(event, Instant::now())
    }

    /// Like [`EventFilter::allow`] with an explicit clock reading.
    pub fn allow_at(&mut self, event: &Event, now: Instant) -> bool {
        let cfg = &self.config;
        if cfg.drop_empty_raw && event.raw_log.is_empty() {
            return false;
        }
        if contains_any(&event.raw_log, &cfg.keep_if_raw_contains) {
            return true;
        }
        if event.severity < cfg.min_severity {
            return false;
        }
        if contains_any(&event.event_type, &cfg.drop_event_types)
            || contains_any(&event.process, &cfg.drop_process_contains)
            || contains_any(&event.raw_log, &cfg.drop_raw_contains)
        {
            return false;
        }

        if cfg.dedupe_bash_history && event.source == "bash_history" {
            if !event.command.is_empty()
                && self.last_bash_command.as_deref() == Some(event.command.as_str())
            {
                return false;
            }
            self.last_bash_command = Some(event.command.clone());
        }

        if !self.window.is_zero() {
            let key = rate_key(event);
            if let Some(seen) = self.last_seen.get(&key) {
                if now.saturating_duration_since(*seen) < self.window {
                    return false;
                }
            }
            self.last_seen.insert(key, now);
            self.prune(now);
        }

        true
    }

    fn prune(&mut self, now: Instant) {
        if self.last_seen.len() <= RATE_TABLE_PRUNE_THRESHOLD {
            return;
        }
        let window = self.window;
        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) < window);
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|n| !n.is_empty() && haystack.contains(n.as_str()))
}

fn rate_key(event: &Event) -> String {
    [
        event.source.as_str(),
        event.event_type.as_str(),
        event.process.as_str(),
        event.user.as_str(),
        event.ip.as_str(),
    ]
    .join("|")
}
