//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `gattlink.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use serde::Deserialize;

use gattlink_adapter_gatttool::GatttoolConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interpreter process settings.
    pub gatttool: GatttoolConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Console settings.
    pub console: ConsoleConfig,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Interactive console configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Print every session event on stdout as one JSON object per line.
    pub echo_events: bool,
}

impl Config {
    /// Load configuration from `gattlink.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("gattlink.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GATTLINK_PROGRAM") {
            self.gatttool.program = val;
        }
        if let Ok(val) = std::env::var("GATTLINK_ADAPTER") {
            self.gatttool.adapter = Some(val);
        }
        if let Ok(val) = std::env::var("GATTLINK_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gatttool.program.trim().is_empty() {
            return Err(ConfigError::Validation(
                "gatttool program must not be empty".to_string(),
            ));
        }
        if self
            .gatttool
            .adapter
            .as_deref()
            .is_some_and(|adapter| adapter.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "gatttool adapter must not be empty when set".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "gattlink=info,gattlink_app=info,gattlink_adapter_gatttool=info".to_string(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { echo_events: true }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
