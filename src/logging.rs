//! Structured logging with `tracing`.
//!
//! Everything goes to stderr so `--view` can print the document on stdout.

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::MobilityError;

/// Filter directives, e.g. `mobility_research=debug`.
pub const LOG_ENV: &str = "MOBILITY_LOG";
/// `text` or `json`.
pub const LOG_FORMAT_ENV: &str = "MOBILITY_LOG_FORMAT";

/// `[logging]` section of `mobility.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// json or text
    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            color: default_true(),
        }
    }
}

/// Install the global subscriber.
///
/// Filter priority: `MOBILITY_LOG`, then `verbose` (debug), then `config.level`.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<(), MobilityError> {
    let filter = build_env_filter(config, verbose)?;
    let format = determine_format(config)?;
    let subscriber = Registry::default().with(filter);

    let result = if format == "json" {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(config.color)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    result.map_err(|e| MobilityError::Config(format!("failed to install logger: {e}")))
}

fn build_env_filter(config: &LoggingConfig, verbose: bool) -> Result<EnvFilter, MobilityError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    let level = if verbose { "debug" } else { config.level.as_str() };
    EnvFilter::try_new(level)
        .map_err(|e| MobilityError::Config(format!("invalid log level '{level}': {e}")))
}

fn determine_format(config: &LoggingConfig) -> Result<String, MobilityError> {
    if let Ok(format) = std::env::var(LOG_FORMAT_ENV) {
        if format == "json" || format == "text" {
            return Ok(format);
        }
    }
    match config.format.as_str() {
        "json" | "text" => Ok(config.format.clone()),
        other => Err(MobilityError::Config(format!(
            "Invalid log format: {other} (must be 'json' or 'text')"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_logging_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "text");
        assert!(config.color);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: LoggingConfig = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(config.format, "json");
        assert_eq!(config.level, "info");
    }

    #[test]
    fn invalid_format_is_rejected() {
        let config = LoggingConfig {
            format: "xml".into(),
            ..Default::default()
        };
        if std::env::var(LOG_FORMAT_ENV).is_err() {
            assert!(determine_format(&config).is_err());
        }
    }

    #[test]
    fn invalid_level_is_rejected() {
        let config = LoggingConfig {
            level: "mobility=loud".into(),
            ..Default::default()
        };
        if std::env::var(LOG_ENV).is_err() {
            assert!(build_env_filter(&config, false).is_err());
        }
    }
}
