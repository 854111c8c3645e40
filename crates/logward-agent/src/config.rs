//! Agent configuration.
//!
//! Configuration is a TOML file with these sections, all optional:
//! - `data_dir`: where the spool and tail state live
//! - `[server]`: collector address and socket timeout
//! - `[agent]`: identity stamped on every payload
//! - `[send]`: batching, spool and loop timing
//! - `[logging]`: log level, format and destination
//! - `[filter]`: event filter rules
//! - `[sources.*]`: which logs to tail

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use logward_collect::FilterConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Collector endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Collector host name or address.
    pub host: String,
    /// Collector TCP port.
    pub port: u16,
    /// Connect, read and write timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the socket timeout. Zero is raised to one second.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Identity stamped on every payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Agent id.
    pub id: String,
    /// Target database name.
    pub database: String,
    /// Host name override. The system host name is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            id: "agent-unknown".to_string(),
            database: "mydb".to_string(),
            hostname: None,
        }
    }
}

/// Batching, spool and loop timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    /// Pending events are flushed into payloads at least this often.
    pub interval_secs: u64,
    /// Events per payload.
    pub batch_size: usize,
    /// Payloads held in memory before spilling to disk. Zero means disk only.
    pub ram_ring_capacity: usize,
    /// Payload budget of one flush.
    pub flush_max_items: usize,
    /// How long one source waits for new lines per tick.
    pub poll_timeout_ms: u64,
    /// Sleep between ticks.
    pub tick_ms: u64,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            batch_size: 2,
            ram_ring_capacity: 256,
            flush_max_items: 800,
            poll_timeout_ms: 250,
            tick_ms: 200,
        }
    }
}

impl SendConfig {
    /// Returns the batch flush interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Returns the per-source poll timeout.
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Returns the loop sleep.
    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Install a log subscriber at all.
    pub enabled: bool,
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Log file, appended to. Standard error when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Text,
            path: None,
        }
    }
}

/// The log sources the agent knows how to tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// The kernel audit log.
    Auditd,
    /// The system log.
    Syslog,
    /// The authentication log.
    Auth,
    /// A user's shell history.
    BashHistory,
}

impl SourceKind {
    /// Every source, in polling order.
    pub const ALL: [Self; 4] = [Self::Auditd, Self::Syslog, Self::Auth, Self::BashHistory];

    /// Returns the key used under `[sources]`.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Auditd => "auditd",
            Self::Syslog => "syslog",
            Self::Auth => "auth",
            Self::BashHistory => "bash_history",
        }
    }

    /// Returns the path tailed when none is configured.
    #[must_use]
    pub const fn default_path(self) -> &'static str {
        match self {
            Self::Auditd => "/var/log/audit/audit.log",
            Self::Syslog => "/var/log/syslog",
            Self::Auth => "/var/log/auth.log",
            Self::BashHistory => "~/.bash_history",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One `[sources.<name>]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Tail this source.
    pub enabled: bool,
    /// File to tail; the source's default path when empty.
    pub path: String,
}

impl SourceConfig {
    fn on(kind: SourceKind) -> Self {
        Self {
            enabled: true,
            path: kind.default_path().to_string(),
        }
    }

    fn off(kind: SourceKind) -> Self {
        Self {
            enabled: false,
            path: kind.default_path().to_string(),
        }
    }
}

/// The `[sources]` section. Unknown source names are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    /// `[sources.auditd]`, enabled by default.
    #[serde(default = "SourcesConfig::default_auditd")]
    pub auditd: SourceConfig,
    /// `[sources.syslog]`, enabled by default.
    #[serde(default = "SourcesConfig::default_syslog")]
    pub syslog: SourceConfig,
    /// `[sources.auth]`, disabled by default.
    #[serde(default = "SourcesConfig::default_auth")]
    pub auth: SourceConfig,
    /// `[sources.bash_history]`, disabled by default.
    #[serde(default = "SourcesConfig::default_bash_history")]
    pub bash_history: SourceConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            auditd: Self::default_auditd(),
            syslog: Self::default_syslog(),
            auth: Self::default_auth(),
            bash_history: Self::default_bash_history(),
        }
    }
}

impl SourcesConfig {
    fn default_auditd() -> SourceConfig {
        SourceConfig::on(SourceKind::Auditd)
    }

    fn default_syslog() -> SourceConfig {
        SourceConfig::on(SourceKind::Syslog)
    }

    fn default_auth() -> SourceConfig {
        SourceConfig::off(SourceKind::Auth)
    }

    fn default_bash_history() -> SourceConfig {
        SourceConfig::off(SourceKind::BashHistory)
    }

    /// Returns the table for `kind`.
    #[must_use]
    pub const fn get(&self, kind: SourceKind) -> &SourceConfig {
        match kind {
            SourceKind::Auditd => &self.auditd,
            SourceKind::Syslog => &self.syslog,
            SourceKind::Auth => &self.auth,
            SourceKind::BashHistory => &self.bash_history,
        }
    }

    /// Returns the path to tail for `kind`.
    #[must_use]
    pub fn path(&self, kind: SourceKind) -> &str {
        let path = self.get(kind).path.as_str();
        if path.is_empty() {
            kind.default_path()
        } else {
            path
        }
    }

    /// Returns the enabled sources in polling order.
    pub fn enabled(&self) -> impl Iterator<Item = SourceKind> + '_ {
        SourceKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).enabled)
    }
}

/// Complete agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Root for the spool and tail state.
    pub data_dir: PathBuf,
    /// Collector endpoint.
    pub server: ServerConfig,
    /// Payload identity.
    pub agent: IdentityConfig,
    /// Batching and timing.
    pub send: SendConfig,
    /// Logging.
    pub logging: LoggingConfig,
    /// Event filter.
    pub filter: FilterConfig,
    /// Log sources.
    pub sources: SourcesConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            server: ServerConfig::default(),
            agent: IdentityConfig::default(),
            send: SendConfig::default(),
            logging: LoggingConfig::default(),
            filter: FilterConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| AgentError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AgentError::Config(format!("cannot render config: {e}")))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(AgentError::Config("server.host cannot be empty".to_string()));
        }
        if self.server.port == 0 {
            return Err(AgentError::Config(
                "server.port must be greater than 0".to_string(),
            ));
        }
        if self.send.batch_size == 0 {
            return Err(AgentError::Config(
                "send.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.send.interval_secs == 0 {
            return Err(AgentError::Config(
                "send.interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.send.flush_max_items == 0 {
            return Err(AgentError::Config(
                "send.flush_max_items must be greater than 0".to_string(),
            ));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(AgentError::Config("data_dir cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Returns `<data_dir>/spool`.
    #[must_use]
    pub fn spool_dir(&self) -> PathBuf {
        self.data_dir.join("spool")
    }

    /// Returns `<data_dir>/state`.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    /// Returns the shared tail state file, `<data_dir>/state/reader.state`.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join("reader.state")
    }

    /// Returns the configured host name, or the system's.
    #[must_use]
    pub fn hostname(&self) -> String {
        self.agent
            .hostname
            .clone()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(system_hostname)
    }
}

fn system_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown-host".to_string())
}
