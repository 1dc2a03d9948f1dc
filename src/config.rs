//! Configuration for the device monitor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main configuration, persisted as JSON under the platform config dir.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Consumer tick interval in milliseconds (how often the queue is
    /// drained).
    pub poll_interval_ms: u64,

    /// Baud rate used when opening serial ports.
    pub baud_rate: u32,

    /// Which global hook sources to capture.
    pub hooks: HookConfig,

    /// Directory for exported logs and CSV files.
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("devmon");

        Self {
            poll_interval_ms: 150,
            baud_rate: 115_200,
            hooks: HookConfig::default(),
            log_dir: data_dir.join("logs"),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists yet.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("devmon")
            .join("config.json")
    }

    /// Ensure the export directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}

/// Which global hook sources the hook worker should capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    pub keyboard: bool,
    pub mouse: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            keyboard: true,
            mouse: true,
        }
    }
}

impl HookConfig {
    pub fn any_enabled(&self) -> bool {
        self.keyboard || self.mouse
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
