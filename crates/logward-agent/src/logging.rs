//! Log subscriber setup.

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{AgentError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builds the level filter: `RUST_LOG` when set, otherwise `level`.
///
/// # Errors
///
/// Returns an error if `level` is not a valid filter directive.
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| AgentError::Config(format!("invalid logging.level '{level}': {e}")))
}

/// Installs the global subscriber described by `config`.
///
/// Returns false if logging is disabled. Output goes to standard error, or
/// is appended to `config.path` without ANSI colours.
///
/// # Errors
///
/// Returns an error if the level is invalid, the log file cannot be
/// opened, or a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<bool> {
    if !config.enabled {
        return Ok(false);
    }
    let filter = env_filter(&config.level)?;

    let layer = match &config.path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            format_layer(config.format, Mutex::new(file), false)
        }
        None => format_layer(config.format, std::io::stderr, true),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| AgentError::Logging(e.to_string()))?;
    Ok(true)
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}
