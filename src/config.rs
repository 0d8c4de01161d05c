use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::MonitorOptions;
use crate::retry::RetryConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
}

/// RPC client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Maximum number of attempts per RPC call
    pub max_retries: u32,
    /// Initial retry delay in seconds
    pub retry_delay_seconds: u64,
    /// Maximum retry delay in seconds
    pub max_retry_delay_seconds: u64,
}

/// Transaction monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay between polling rounds in milliseconds
    pub poll_delay_ms: u64,
    /// Give up after this many failed rounds in a row; unset polls forever
    pub max_consecutive_failures: Option<u32>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8545".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 1,
            max_retry_delay_seconds: 10,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_delay_ms: 500,
            max_consecutive_failures: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl RpcConfig {
    /// Retry policy applied to each RPC call
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            initial_delay_seconds: self.retry_delay_seconds,
            max_delay_seconds: self.max_retry_delay_seconds,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl MonitorConfig {
    pub fn to_options(&self) -> MonitorOptions {
        MonitorOptions {
            poll_delay: Duration::from_millis(self.poll_delay_ms),
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    /// Environment variables take precedence over file values
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the TOML file named by `CONFIG_FILE`
    pub fn load_from_file() -> Result<Self, ConfigError> {
        let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if !Path::new(&config_path).exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ConfigError::FileNotFound(config_path.clone()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(endpoint) = env::var("RPC_URL") {
            self.rpc.endpoint = endpoint;
        }
        if let Ok(timeout) = env::var("RPC_TIMEOUT_SECONDS") {
            self.rpc.timeout_seconds = parse_env("RPC_TIMEOUT_SECONDS", timeout)?;
        }
        if let Ok(retries) = env::var("RPC_MAX_RETRIES") {
            self.rpc.max_retries = parse_env("RPC_MAX_RETRIES", retries)?;
        }

        if let Ok(delay) = env::var("MONITOR_POLL_DELAY_MS") {
            self.monitor.poll_delay_ms = parse_env("MONITOR_POLL_DELAY_MS", delay)?;
        }
        if let Ok(failures) = env::var("MONITOR_MAX_CONSECUTIVE_FAILURES") {
            self.monitor.max_consecutive_failures =
                Some(parse_env("MONITOR_MAX_CONSECUTIVE_FAILURES", failures)?);
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rpc.endpoint.starts_with("http://") && !self.rpc.endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.rpc.endpoint.clone()));
        }

        if self.rpc.timeout_seconds == 0 || self.rpc.timeout_seconds > 300 {
            return Err(invalid("rpc.timeout_seconds", self.rpc.timeout_seconds));
        }

        if self.rpc.max_retries == 0 || self.rpc.max_retries > 20 {
            return Err(invalid("rpc.max_retries", self.rpc.max_retries));
        }

        if self.rpc.retry_delay_seconds > self.rpc.max_retry_delay_seconds {
            return Err(invalid("rpc.retry_delay_seconds", self.rpc.retry_delay_seconds));
        }

        // One hour between rounds is already far past any block time
        if self.monitor.poll_delay_ms == 0 || self.monitor.poll_delay_ms > 3_600_000 {
            return Err(invalid("monitor.poll_delay_ms", self.monitor.poll_delay_ms));
        }

        if self.monitor.max_consecutive_failures == Some(0) {
            return Err(invalid("monitor.max_consecutive_failures", 0));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid("logging.level", &self.logging.level));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(invalid("logging.format", &self.logging.format));
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample_config() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| ConfigError::Parsing(e.to_string()))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
