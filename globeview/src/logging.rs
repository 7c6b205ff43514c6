//! Tracing subscriber setup.
//!
//! Console output always; file output when a log directory is given. The
//! filter defaults to `globeview=info` and `RUST_LOG` overrides it.

use std::path::PathBuf;

use thiserror::Error;
use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "globeview=info";

const LOG_FILE_PREFIX: &str = "globeview.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to install tracing subscriber: {0}")]
    Init(String),
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
    /// Directory for a daily-rotated log file, if any
    pub log_dir: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_FILTER.to_string(),
            log_dir: None,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Debug-level filter for the library and the CLI.
    pub fn verbose() -> Self {
        Self {
            default_filter: "globeview=debug".to_string(),
            ..Self::default()
        }
    }
}

/// Installs the global subscriber.
///
/// # Returns
///
/// The file writer guard when a log directory was configured. Hold it until
/// exit; dropping it flushes and stops the background writer.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.default_filter).map_err(|e| {
            LoggingError::InvalidFilter {
                filter: config.default_filter.clone(),
                reason: e.to_string(),
            }
        })?,
    };

    let timer = LocalTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ));

    let console = fmt::layer()
        .with_timer(timer.clone())
        .with_ansi(config.ansi)
        .with_target(true);

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_timer(timer)
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
        assert!(EnvFilter::try_new(LoggingConfig::verbose().default_filter).is_ok());
    }
}
