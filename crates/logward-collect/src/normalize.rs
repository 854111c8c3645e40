//! Timestamp and raw-text normalization.
//!
//! Collectors see timestamps in whatever form the source writes them. Every
//! event leaves this module with a UTC timestamp of the form
//! `YYYY-MM-DDTHH:MM:SS.mmmZ` (when the input could be parsed) and a
//! `raw_log` free of control characters, quotes and backslashes.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Timelike, Utc};

use crate::event::Event;

const OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Converts a timestamp to `YYYY-MM-DDTHH:MM:SS.mmmZ` in UTC.
///
/// Accepts `YYYY-MM-DD[T| ]HH:MM:SS`, an optional fraction (kept to
/// milliseconds, truncated), and an optional `Z` or `±HH:MM` zone. Without
/// a zone the local time zone is assumed. Input that does not parse is
/// returned unchanged.
#[must_use]
pub fn to_iso_utc(ts: &str) -> String {
    parse_timestamp(ts.trim()).map_or_else(|| ts.to_string(), |dt| format_utc(&dt))
}

/// Returns the current time in the normalized format.
#[must_use]
pub fn now_iso() -> String {
    format_utc(&Utc::now())
}

/// Formats a UTC instant in the normalized format.
#[must_use]
pub fn format_utc(dt: &DateTime<Utc>) -> String {
    dt.format(OUTPUT_FORMAT).to_string()
}

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let bytes = ts.as_bytes();
    let shaped = bytes.len() >= 19
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && matches!(bytes[10], b'T' | b' ')
        && bytes[13] == b':'
        && bytes[16] == b':';
    if !shaped {
        return None;
    }

    let base = format!("{}T{}", ts.get(..10)?, ts.get(11..19)?);
    let naive = NaiveDateTime::parse_from_str(&base, "%Y-%m-%dT%H:%M:%S").ok()?;

    let mut rest = ts.get(19..)?;
    let mut millis = 0u32;
    if let Some(frac) = rest.strip_prefix('.') {
        let digits = frac.bytes().take_while(u8::is_ascii_digit).count();
        millis = frac[..digits]
            .bytes()
            .chain(std::iter::repeat(b'0'))
            .take(3)
            .fold(0, |acc, d| acc * 10 + u32::from(d - b'0'));
        rest = &frac[digits..];
    }
    let naive = naive.with_nanosecond(millis * 1_000_000)?;

    match rest.as_bytes().first() {
        Some(b'Z') => Some(Utc.from_utc_datetime(&naive)),
        Some(sign @ (b'+' | b'-')) => {
            let offset = parse_offset(&rest[1..])?;
            let offset = if *sign == b'-' { -offset } else { offset };
            let zone = FixedOffset::east_opt(offset)?;
            zone.from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        }
        _ => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Parses `HH:MM` into seconds.
fn parse_offset(s: &str) -> Option<i32> {
    let bytes = s.as_bytes();
    if bytes.len() < 5 || bytes[2] != b':' {
        return None;
    }
    let hours: i32 = s.get(..2)?.parse().ok()?;
    let minutes: i32 = s.get(3..5)?.parse().ok()?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return None;
    }
    Some(hours * 3600 + minutes * 60)
}

/// Replaces control characters, `"` and `\` with spaces and trims trailing
/// whitespace.
#[must_use]
pub fn sanitize_raw(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_control() || c == '"' || c == '\\' {
                ' '
            } else {
                c
            }
        })
        .collect();
    cleaned.trim_end().to_string()
}

/// Normalizes an event in place.
///
/// Non-empty timestamps go through [`to_iso_utc`], `raw_log` through
/// [`sanitize_raw`], and an empty source or event type becomes `unknown`
/// or `raw`.
pub fn normalize_event(event: &mut Event) {
    if !event.timestamp.is_empty() {
        event.timestamp = to_iso_utc(&event.timestamp);
    }
    if !event.raw_log.is_empty() {
        event.raw_log = sanitize_raw(&event.raw_log);
    }
    if event.source.is_empty() {
        event.source = "unknown".to_string();
    }
    if event.event_type.is_empty() {
        event.event_type = "raw".to_string();
    }
}
