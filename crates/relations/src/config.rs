//! Configuration for the relationship layer
//!
//! Values are read from `SPORTSDB_*` environment variables. Everything except
//! the API base URL has a default.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LoggingConfig;

pub const ENV_API_BASE_URL: &str = "SPORTSDB_API_BASE_URL";
pub const ENV_API_TOKEN: &str = "SPORTSDB_API_TOKEN";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "SPORTSDB_REQUEST_TIMEOUT_SECS";
pub const ENV_MAX_BATCH_SIZE: &str = "SPORTSDB_MAX_BATCH_SIZE";
pub const ENV_MULTI_VALUE_FILTERS: &str = "SPORTSDB_MULTI_VALUE_FILTERS";
pub const ENV_PRELOAD_PAGE_SIZE: &str = "SPORTSDB_PRELOAD_PAGE_SIZE";

/// Top-level configuration: gateway, loader and logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationsConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    pub max_batch_size: usize,
    pub multi_value_filters: bool,
    pub preload_page_size: usize,
    pub logging: LoggingConfig,
}

impl Default for RelationsConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/v1".to_string(),
            api_token: None,
            request_timeout_secs: 30,
            max_batch_size: 100,
            multi_value_filters: false,
            preload_page_size: 100,
            logging: LoggingConfig::default(),
        }
    }
}

impl RelationsConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base_url = get_env_required(ENV_API_BASE_URL)?;
        let api_token = get_env_optional(ENV_API_TOKEN).filter(|t| !t.is_empty());

        let request_timeout_secs = parse_env(ENV_REQUEST_TIMEOUT_SECS, "30", "request_timeout_secs", "whole seconds")?;
        let max_batch_size = parse_env(ENV_MAX_BATCH_SIZE, "100", "max_batch_size", "a positive number")?;
        let multi_value_filters = parse_bool(ENV_MULTI_VALUE_FILTERS, "multi_value_filters", false)?;
        let preload_page_size = parse_env(ENV_PRELOAD_PAGE_SIZE, "100", "preload_page_size", "a positive number")?;

        let config = Self {
            api_base_url,
            api_token,
            request_timeout_secs,
            max_batch_size,
            multi_value_filters,
            preload_page_size,
            logging: LoggingConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "api_base_url".to_string(),
                reason: "API base URL cannot be empty".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "request_timeout_secs".to_string(),
                reason: "Request timeout cannot be 0".to_string(),
            });
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "max_batch_size".to_string(),
                reason: "Batch size cannot be 0".to_string(),
            });
        }
        if self.preload_page_size == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "preload_page_size".to_string(),
                reason: "Preload page size cannot be 0".to_string(),
            });
        }
        self.logging.validate()
    }
}

fn get_env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar {
        var: key.to_string(),
    })
}

fn get_env_optional(key: &str) -> Option<String> {
    env::var(key).ok()
}

pub(crate) fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(
    key: &str,
    default: &str,
    field: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    let raw = get_env_or_default(key, default);
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.clone(),
        expected: expected.to_string(),
    })
}

fn parse_bool(key: &str, field: &str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = get_env_optional(key) else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw,
            expected: "true or false".to_string(),
        }),
    }
}
