//! Structured logging setup
//!
//! The library itself only emits `tracing` events. Binaries and test
//! harnesses embedding it call `init_logging` once to install a subscriber.

use std::io;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::get_env_or_default;
use crate::error::ConfigError;

pub const ENV_LOG_LEVEL: &str = "SPORTSDB_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "SPORTSDB_LOG_FORMAT";

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_FORMATS: [&str; 3] = ["compact", "pretty", "json"];

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug")
    pub level: String,
    /// One of "compact", "pretty", "json"
    pub format: String,
    /// Optional env-filter directive, e.g. "sportsdb_relations=debug,reqwest=warn"
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Create production logging configuration
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            env_filter: Some("sportsdb_relations=info,reqwest=warn".to_string()),
        }
    }

    /// Create development logging configuration
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: "pretty".to_string(),
            env_filter: Some("sportsdb_relations=debug,reqwest=info".to_string()),
        }
    }

    /// Create test logging configuration (minimal output)
    pub fn test() -> Self {
        Self {
            level: "error".to_string(),
            format: "compact".to_string(),
            env_filter: Some("sportsdb_relations=error".to_string()),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            level: get_env_or_default(ENV_LOG_LEVEL, "info").to_lowercase(),
            format: get_env_or_default(ENV_LOG_FORMAT, "compact").to_lowercase(),
            env_filter: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LEVELS.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "level".to_string(),
                value: self.level.clone(),
                expected: "trace, debug, info, warn, or error".to_string(),
            });
        }
        if !VALID_FORMATS.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "format".to_string(),
                value: self.format.clone(),
                expected: "compact, pretty, or json".to_string(),
            });
        }
        Ok(())
    }

    /// Set environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// the configured filter.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    config.validate()?;
    let directive = config.env_filter.as_deref().unwrap_or(&config.level);
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(directive))?;

    let registry = tracing_subscriber::registry().with(filter);
    match config.format.as_str() {
        "json" => registry
            .with(Layer::new().with_writer(io::stdout).json())
            .try_init()?,
        "pretty" => registry
            .with(Layer::new().with_writer(io::stdout).pretty())
            .try_init()?,
        _ => registry
            .with(Layer::new().with_writer(io::stdout).compact())
            .try_init()?,
    }

    tracing::info!(
        target: "sportsdb_relations::logging",
        level = %config.level,
        format = %config.format,
        "Structured logging initialized"
    );
    Ok(())
}
