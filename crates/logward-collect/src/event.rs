//! The normalized event model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CollectError;

/// Event severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine activity.
    #[default]
    Low,
    /// Worth a look: privilege use, service changes, warnings.
    Medium,
    /// Denials and authentication failures.
    High,
}

impl Severity {
    /// Returns the lower-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CollectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(CollectError::InvalidSeverity(s.to_string())),
        }
    }
}

/// One normalized security event.
///
/// Optional fields are empty strings when unknown and are left out of the
/// serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// `YYYY-MM-DDTHH:MM:SS.mmmZ` once normalized.
    pub timestamp: String,
    /// Host the event was collected on.
    pub hostname: String,
    /// Source name, e.g. `auditd` or `auth.log`.
    pub source: String,
    /// Source-specific classification, e.g. `ssh_fail`.
    pub event_type: String,
    /// Severity.
    pub severity: Severity,
    /// Process name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub process: String,
    /// User name or id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    /// Command line or message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    /// Remote address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    /// The sanitized original line.
    pub raw_log: String,
}
