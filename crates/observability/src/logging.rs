//! `tracing-subscriber` initialization.
//!
//! `RUST_LOG` takes precedence over the configured default directive. The
//! output format comes from `INVOICEKIT_LOG_FORMAT` (`json`, the default, or
//! `pretty` for local development).

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_ENV: &str = "INVOICEKIT_LOG_FORMAT";
pub const DEFAULT_DIRECTIVE: &str = "info";

#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid log filter: {0}")]
    Filter(String),
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Used when `RUST_LOG` is unset.
    pub default_directive: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_directive: DEFAULT_DIRECTIVE.to_string(),
            format: LogFormat::Json,
        }
    }
}

impl LogConfig {
    /// Read the format from the environment; an unknown value keeps JSON.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let format = lookup(LOG_FORMAT_ENV)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        Self {
            format,
            ..Self::default()
        }
    }

    fn filter(&self) -> Result<EnvFilter, InitError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.default_directive)
                .map_err(|e| InitError::Filter(e.to_string())),
        }
    }
}

/// Install the global subscriber.
pub fn try_init(config: &LogConfig) -> Result<(), InitError> {
    let filter = config.filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    installed.map_err(|_| InitError::AlreadyInitialized)
}
