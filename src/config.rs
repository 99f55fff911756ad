//! Configuration management for Helios
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for environment variable overrides.

use crate::error::{HeliosError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Environment variable overriding `api.base_url`
pub const ENV_API_BASE: &str = "HELIOS_API_BASE";
/// Environment variable overriding `api.history_hours`
pub const ENV_HISTORY_HOURS: &str = "HELIOS_HISTORY_HOURS";
/// Environment variable overriding `poll_interval_ms`
pub const ENV_POLL_INTERVAL_MS: &str = "HELIOS_POLL_INTERVAL_MS";

/// Largest history window the telemetry API serves (one week)
pub const MAX_HISTORY_HOURS: u32 = 168;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telemetry API connection configuration
    pub api: ApiConfig,

    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Path of the JSON file backing presentation preferences
    pub settings_file: String,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Telemetry API endpoint parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL serving `/api/current` and `/api/history`
    pub base_url: String,

    /// Width of the requested history window in hours (1..=168)
    pub history_hours: u32,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (its parent directory receives the rotated files)
    pub file: String,

    /// Number of backup files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl ApiConfig {
    /// Request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations, apply environment
    /// overrides and validate the result
    pub fn load() -> Result<Self> {
        let default_paths = [
            "helios_config.yaml",
            "/data/helios_config.yaml",
            "/etc/helios/config.yaml",
        ];

        let mut config = default_paths
            .iter()
            .find(|p| Path::new(p).exists())
            .map(Self::from_file)
            .transpose()?
            .unwrap_or_default();

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Apply `HELIOS_*` overrides using the given variable lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = base.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_HISTORY_HOURS) {
            self.api.history_hours = raw.trim().parse().map_err(|_| {
                HeliosError::validation(ENV_HISTORY_HOURS.to_string(), format!("not a number: {raw}"))
            })?;
        }

        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = raw.trim().parse().map_err(|_| {
                HeliosError::validation(
                    ENV_POLL_INTERVAL_MS.to_string(),
                    format!("not a number: {raw}"),
                )
            })?;
        }

        Ok(())
    }

    /// Polling interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let base = self.api.base_url.trim();
        if base.is_empty() {
            return Err(HeliosError::validation(
                "api.base_url",
                "Base URL cannot be empty",
            ));
        }

        match reqwest::Url::parse(base) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(_) => {
                return Err(HeliosError::validation(
                    "api.base_url",
                    "Scheme must be http or https",
                ));
            }
            Err(_) => {
                return Err(HeliosError::validation(
                    "api.base_url",
                    "Not a valid URL",
                ));
            }
        }

        if self.api.history_hours == 0 || self.api.history_hours > MAX_HISTORY_HOURS {
            return Err(HeliosError::validation(
                "api.history_hours",
                "Must be between 1 and 168",
            ));
        }

        if self.api.request_timeout_ms == 0 {
            return Err(HeliosError::validation(
                "api.request_timeout_ms",
                "Must be greater than 0",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(HeliosError::validation(
                "poll_interval_ms",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}
