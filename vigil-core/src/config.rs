//! Configuration management

use crate::error::{ErrorContext, VigilError, VigilResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the session lifecycle system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigilConfig {
    /// Bootstrap guard timeout in milliseconds (readiness resolves with no
    /// principal if the provider never calls back within this window)
    pub bootstrap_timeout_ms: u64,
    /// Grace period in milliseconds during which registry removal
    /// detection is suppressed after login
    pub grace_period_ms: u64,
    /// Device-local storage namespace directory
    pub storage_dir: String,
    /// Capacity of the session event broadcast channel
    pub event_capacity: usize,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for VigilConfig {
    fn default() -> Self {
        let storage_dir = dirs::data_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("vigil")
            .to_string_lossy()
            .to_string();

        Self {
            bootstrap_timeout_ms: 4000,
            grace_period_ms: 8000,
            storage_dir,
            event_capacity: 100,
            logging: LoggingConfig::default(),
        }
    }
}

impl VigilConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> VigilResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| VigilError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: VigilConfig = toml::from_str(&content).map_err(|e| VigilError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> VigilResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| VigilError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| VigilError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> VigilResult<()> {
        if self.bootstrap_timeout_ms == 0 {
            return Err(VigilError::Config {
                message: "bootstrap_timeout_ms must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set bootstrap_timeout_ms to a positive value"),
            });
        }

        if self.event_capacity == 0 {
            return Err(VigilError::Config {
                message: "event_capacity must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set event_capacity to a positive value"),
            });
        }

        if self.storage_dir.is_empty() {
            return Err(VigilError::Config {
                message: "storage_dir must not be empty".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set storage_dir to a writable directory"),
            });
        }

        Ok(())
    }
}
