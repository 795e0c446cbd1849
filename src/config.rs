//! Configuration management for shell-runner.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::execution::{
    EngineConfig, LaunchSettings, TimeoutPolicy, DEFAULT_GRACE_PERIOD, DEFAULT_LONG_KEYWORDS,
    DEFAULT_LONG_TIMEOUT, DEFAULT_MAX_CHUNK, DEFAULT_SHORT_TIMEOUT,
};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shell used for ordinary commands.
    pub shell: ShellSection,
    /// Helper used for `sudo` commands.
    pub privileged: PrivilegedSection,
    /// Timeout policy.
    pub timeouts: TimeoutsSection,
    /// Output processing.
    pub output: OutputSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Shell configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    /// Shell program.
    pub program: String,
    /// Arguments placed before the command text.
    pub args: Vec<String>,
}

impl Default for ShellSection {
    fn default() -> Self {
        let launch = LaunchSettings::default();
        Self {
            program: launch.shell,
            args: launch.shell_args,
        }
    }
}

/// Privileged helper configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivilegedSection {
    /// Helper program.
    pub program: String,
    /// Arguments making the helper read the credential from stdin.
    pub args: Vec<String>,
}

impl Default for PrivilegedSection {
    fn default() -> Self {
        let launch = LaunchSettings::default();
        Self {
            program: launch.privileged_program,
            args: launch.privileged_args,
        }
    }
}

/// Timeout configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    /// Timeout for ordinary commands, in seconds.
    pub short_secs: u64,
    /// Timeout for long-running commands, in seconds.
    pub long_secs: u64,
    /// Substrings that select the long timeout.
    pub long_keywords: Vec<String>,
    /// Grace window between SIGTERM and SIGKILL, in milliseconds.
    pub grace_ms: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            short_secs: DEFAULT_SHORT_TIMEOUT.as_secs(),
            long_secs: DEFAULT_LONG_TIMEOUT.as_secs(),
            long_keywords: DEFAULT_LONG_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            grace_ms: DEFAULT_GRACE_PERIOD.as_millis() as u64,
        }
    }
}

/// Output configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Strip ANSI escape sequences and control bytes from process output.
    /// Off by default so payloads match what the process wrote.
    pub strip_ansi: bool,
    /// Longest payload for output that never ends a line, in bytes.
    pub max_chunk: usize,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            strip_ansi: false,
            max_chunk: DEFAULT_MAX_CHUNK,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: crate::logging::DEFAULT_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Some(secs) = env_number("SHELL_RUNNER_SHORT_TIMEOUT") {
            self.timeouts.short_secs = secs;
        }

        if let Some(secs) = env_number("SHELL_RUNNER_LONG_TIMEOUT") {
            self.timeouts.long_secs = secs;
        }

        if let Ok(shell) = std::env::var("SHELL_RUNNER_SHELL") {
            if !shell.is_empty() {
                self.shell.program = shell;
            }
        }

        if let Ok(level) = std::env::var("SHELL_RUNNER_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(secs) = args.short_timeout {
            self.timeouts.short_secs = secs;
        }

        if let Some(secs) = args.long_timeout {
            self.timeouts.long_secs = secs;
        }

        if let Some(ms) = args.grace_ms {
            self.timeouts.grace_ms = ms;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env();
        config.apply_args(args);
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shell.program.trim().is_empty() {
            return Err(ConfigError::Invalid("shell.program is empty".into()));
        }
        if self.privileged.program.trim().is_empty() {
            return Err(ConfigError::Invalid("privileged.program is empty".into()));
        }
        if self.timeouts.short_secs == 0 || self.timeouts.long_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least one second".into()));
        }
        Ok(())
    }

    /// Convert to the runtime settings of the execution engine.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            launch: LaunchSettings {
                shell: self.shell.program.clone(),
                shell_args: self.shell.args.clone(),
                privileged_program: self.privileged.program.clone(),
                privileged_args: self.privileged.args.clone(),
            },
            timeouts: TimeoutPolicy {
                short: Duration::from_secs(self.timeouts.short_secs),
                long: Duration::from_secs(self.timeouts.long_secs),
                long_keywords: self.timeouts.long_keywords.clone(),
                grace: Duration::from_millis(self.timeouts.grace_ms),
            },
            strip_ansi: self.output.strip_ansi,
            max_chunk: self.output.max_chunk,
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// A setting has an unusable value.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::Invalid(reason) => write!(f, "invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}
