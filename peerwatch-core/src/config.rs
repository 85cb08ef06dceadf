//! Configuration loading for peerwatch.
//!
//! Configuration is loaded from a TOML file (default: `peerwatch.toml`).

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::folder::FolderConfig;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Device tracking configuration.
    #[serde(default)]
    pub devices: DevicesConfig,
    /// Configured folders.
    #[serde(default)]
    pub folders: Vec<FolderConfig>,
}

/// Device tracking configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DevicesConfig {
    /// Seconds without a request before a device stops counting as
    /// syncing (default: 30).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    30
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl DevicesConfig {
    /// Idle window as a duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Config {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, cannot be parsed, or
    /// fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but make no sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "devices.idle_timeout_secs must be > 0".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for folder in &self.folders {
            if folder.id.is_empty() {
                return Err(ConfigError::Invalid {
                    reason: format!("folder at {} has an empty id", folder.path.display()),
                });
            }
            if !seen.insert(folder.id.as_str()) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate folder id: {}", folder.id),
                });
            }
        }

        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Configuration parsed but is not usable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}
