//! Configuration management for cosmos-shuttle
//!
//! Settings come from a TOML file and the command line:
//!
//! ```toml
//! [connection]
//! uri = "emulator"
//! timeout = 120
//!
//! [transfer]
//! batch_size = 25
//! page_size = 100
//! camel_case = false
//! progress = true
//!
//! [logging]
//! level = "info"
//! timestamps = false
//! ```
//!
//! Precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::transfer::{DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE, MAX_BATCH_SIZE};
use crate::utils::validate;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Export and import settings
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection string, or `emulator` for the local emulator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Export and import settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Concurrent upserts per import batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Documents per export page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Normalize every field name on import
    #[serde(default)]
    pub camel_case: bool,

    /// Draw progress on stderr
    #[serde(default = "default_progress")]
    pub progress: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Prefix log lines with timestamps
    #[serde(default)]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn default_timeout() -> u64 {
    120
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_progress() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: None,
            timeout: default_timeout(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            page_size: default_page_size(),
            camel_case: false,
            progress: default_progress(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.display().to_string()),
            _ => ConfigError::Generic(format!("failed to read {}: {e}", path.display())),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration for a run.
    ///
    /// An explicit path must exist. Without one, the default path is used if
    /// present and defaults apply otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Self::default_path();
                if path.is_file() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cosmos-shuttle")
            .join("config.toml")
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Generic(e.to_string()).into())
    }

    /// Save configuration to a file, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let transfer = &self.transfer;
        if !(1..=MAX_BATCH_SIZE).contains(&transfer.batch_size) {
            return Err(invalid("transfer.batch_size", transfer.batch_size));
        }
        if transfer.page_size == 0 {
            return Err(invalid("transfer.page_size", transfer.page_size));
        }
        if self.connection.timeout == 0 {
            return Err(invalid("connection.timeout", self.connection.timeout));
        }
        self.connection.validate_uri()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.timeout)
    }
}

fn invalid(field: &str, value: impl ToString) -> crate::error::ShuttleError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl ConnectionConfig {
    /// Check the connection string format, if one is configured
    pub fn validate_uri(&self) -> Result<()> {
        match self.uri.as_deref() {
            None => Ok(()),
            Some(uri) if uri.eq_ignore_ascii_case("emulator") => Ok(()),
            Some(uri) if validate::is_valid_connection_uri(uri) => Ok(()),
            Some(_) => Err(invalid("connection.uri", "<redacted>")),
        }
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
