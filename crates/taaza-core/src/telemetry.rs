//! Logging initialization.
//!
//! Installs a global `tracing` subscriber. `RUST_LOG` always wins over the
//! configured level so operators can raise verbosity without touching config
//! files.

use crate::{TaazaError, TaazaResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-field lines.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include the event target (module path) in each line.
    #[serde(default = "default_with_target")]
    pub with_target: bool,
}

fn default_level() -> String {
    "info,taaza=debug,tower_http=debug".to_string()
}

fn default_with_target() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            with_target: default_with_target(),
        }
    }
}

impl LoggingConfig {
    /// Builds the env filter, preferring `RUST_LOG` when present.
    pub fn env_filter(&self) -> TaazaResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level).map_err(|e| {
                TaazaError::Configuration(format!("Invalid log level '{}': {}", self.level, e))
            }),
        }
    }
}

/// Initialize the global tracing subscriber.
pub fn init_logging(config: &LoggingConfig) -> TaazaResult<()> {
    let filter = config.env_filter()?;

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.with_target),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
            .try_init(),
    };

    result.map_err(|e| TaazaError::Internal(format!("Failed to install log subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.level.starts_with("info"));
        assert!(config.with_target);
    }

    #[test]
    fn test_format_deserialization() {
        let config: LoggingConfig =
            serde_json::from_str(r#"{"level":"warn","format":"pretty"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.level, "warn");
        assert!(config.with_target);
    }

    #[test]
    fn test_invalid_level_is_configuration_error() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "taaza=notalevel".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            config.env_filter(),
            Err(TaazaError::Configuration(_))
        ));
    }
}
