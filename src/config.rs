//! Configuration management for remote-runner.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file (JSON)
//! 3. Default values

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default chunk size for draining pipes and streaming file content.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Default capacity of loopback session pipes.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Runner behaviour.
    pub runner: RunnerSection,
    /// Loopback session settings.
    pub local: LocalSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Runner configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    /// Run copy and remove commands through `sudo`.
    pub elevate: bool,
    /// Program started in sink mode to receive copied files.
    pub receiver: String,
    /// Chunk size used when draining output and streaming file content.
    pub read_buffer_size: usize,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            elevate: true,
            receiver: "scp".to_string(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Loopback session configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSection {
    /// Shell used to interpret command lines.
    pub shell: String,
    /// Capacity in bytes of each session pipe.
    pub pipe_capacity: usize,
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(elevate) = std::env::var("REMOTE_RUNNER_ELEVATE") {
            if let Ok(elevate) = elevate.parse() {
                self.runner.elevate = elevate;
            }
        }

        if let Ok(receiver) = std::env::var("REMOTE_RUNNER_RECEIVER") {
            if !receiver.is_empty() {
                self.runner.receiver = receiver;
            }
        }

        if let Ok(shell) = std::env::var("REMOTE_RUNNER_SHELL") {
            if !shell.is_empty() {
                self.local.shell = shell;
            }
        }

        if let Ok(level) = std::env::var("REMOTE_RUNNER_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: env vars > config file > defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.validate()?;

        Ok(config)
    }

    /// Reject values the runner cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.receiver.trim().is_empty() {
            return Err(ConfigError::InvalidValue("runner.receiver", "must not be empty"));
        }
        if self.runner.read_buffer_size == 0 {
            return Err(ConfigError::InvalidValue("runner.read_buffer_size", "must be positive"));
        }
        if self.local.shell.trim().is_empty() {
            return Err(ConfigError::InvalidValue("local.shell", "must not be empty"));
        }
        if self.local.pipe_capacity == 0 {
            return Err(ConfigError::InvalidValue("local.pipe_capacity", "must be positive"));
        }
        Ok(())
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing error.
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
    /// A field holds a value the runner cannot use.
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, &'static str),
}
