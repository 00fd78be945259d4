//! Logging configuration and subscriber setup.

use anyhow::{Result, anyhow};
use clap::{Args, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct LoggingConfig {
    /// Default log level; `RUST_LOG` takes precedence when set
    #[arg(long = "log-level", env = "LOG_LEVEL", default_value = "info")]
    pub level: String,

    #[arg(long = "log-format", env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    fn filter(&self) -> Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level)
                .map_err(|e| anyhow!("invalid log level {:?}: {}", self.level, e)),
        }
    }

    /// Install the global subscriber. Call once, before anything logs.
    pub fn init(&self) -> Result<()> {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter()?)
            .with_target(false);
        match self.format {
            LogFormat::Text => builder
                .try_init()
                .map_err(|e| anyhow!("failed to install log subscriber: {e}")),
            LogFormat::Json => builder
                .json()
                .try_init()
                .map_err(|e| anyhow!("failed to install log subscriber: {e}")),
        }
    }
}
