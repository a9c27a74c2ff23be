//! Configuration - TOML 設定
//!
//! Every section is optional; a missing file section falls back to its
//! defaults, so an empty document is a valid configuration.
//!
//! ```toml
//! [router]
//! name = "support"
//!
//! [callbacks]
//! enabled = true
//! max_attempts = 3
//! base_delay_ms = 200
//! multiplier = 2.0
//! cancel_on_failure = true
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SwitchboardConfig {
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub callbacks: CallbackConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterSection {
    /// Tenant name; shows up in logs and status output.
    #[serde(default = "default_router_name")]
    pub name: String,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            name: default_router_name(),
        }
    }
}

fn default_router_name() -> String {
    "default".to_string()
}

/// Callback delivery and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Attempts per notification, first attempt included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Put the task back in its queue when an assignment cannot be delivered.
    #[serde(default = "default_true")]
    pub cancel_on_failure: bool,
}

impl CallbackConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            cancel_on_failure: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_multiplier() -> f64 {
    2.0
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    #[default]
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// EnvFilter directive; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SwitchboardConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SwitchboardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.router.name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "router.name must not be empty".to_string(),
            ));
        }
        if self.callbacks.max_attempts < 1 {
            return Err(ConfigError::InvalidConfig(
                "callbacks.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.callbacks.multiplier >= 1.0) {
            return Err(ConfigError::InvalidConfig(format!(
                "callbacks.multiplier must be >= 1.0, got {}",
                self.callbacks.multiplier
            )));
        }
        Ok(())
    }
}
