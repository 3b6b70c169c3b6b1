//! Analysis Configuration
//!
//! Configuration can be set programmatically or loaded from environment
//! variables.
//!
//! # Environment Variables
//!
//! All environment variables use the `FRAGCHECK_` prefix:
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `FRAGCHECK_MAX_NESTING_DEPTH` | Deepest allowed nested discovery | 64 |
//! | `FRAGCHECK_WARNINGS_AS_ERRORS` | Abort on side-effect warnings ("true"/"false") | false |
//! | `FRAGCHECK_RECOVER_ERRORS` | Continue past recoverable errors ("true"/"false") | false |
//! | `FRAGCHECK_LOG_LEVEL` | Log level (off/error/warn/info/debug/trace) | warn |
//!
//! # Example
//!
//! ```rust
//! use fragcheck::config::{AnalysisConfig, LogLevel};
//!
//! let config = AnalysisConfig::builder()
//!     .max_nesting_depth(16)
//!     .log_level(LogLevel::Debug)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.max_nesting_depth, 16);
//! ```

use std::env;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Log level for analysis logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Off,
    Error,
    /// Warnings and errors (default).
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parse a log level from a string.
    #[allow(clippy::should_implement_trait)] // returns Option, not a FromStr error
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "none" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Convert to a string representation (also a valid filter directive).
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Deepest allowed chain of nested candidates.
    /// Default: 64.
    pub max_nesting_depth: usize,

    /// Treat side-effect warnings as fatal.
    /// Default: false.
    pub warnings_as_errors: bool,

    /// Continue past recoverable errors (e.g. a function registered twice)
    /// when no error handler decides otherwise.
    /// Default: false.
    pub recover_errors: bool,

    /// Log level used by [`AnalysisConfig::init_tracing`].
    /// Default: Warn.
    pub log_level: LogLevel,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 64,
            warnings_as_errors: false,
            recover_errors: false,
            log_level: LogLevel::Warn,
        }
    }
}

impl AnalysisConfig {
    /// Create a new builder for AnalysisConfig.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// Variables that are unset or fail to parse keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = parse_env_usize("FRAGCHECK_MAX_NESTING_DEPTH") {
            if val > 0 {
                config.max_nesting_depth = val;
            }
        }

        if let Some(val) = parse_env_bool("FRAGCHECK_WARNINGS_AS_ERRORS") {
            config.warnings_as_errors = val;
        }

        if let Some(val) = parse_env_bool("FRAGCHECK_RECOVER_ERRORS") {
            config.recover_errors = val;
        }

        if let Ok(val) = env::var("FRAGCHECK_LOG_LEVEL") {
            if let Some(level) = LogLevel::from_str(&val) {
                config.log_level = level;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_nesting_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_nesting_depth".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Install a `tracing` subscriber filtered at `log_level`.
    ///
    /// `RUST_LOG` overrides the configured level when set. Fails if a global
    /// subscriber is already installed.
    pub fn init_tracing(&self) -> Result<(), ConfigError> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.log_level.as_str()));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
            .map_err(|err| ConfigError::Tracing(err.to_string()))
    }
}

/// Configuration error.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid configuration for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
}

/// Builder for AnalysisConfig.
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deepest allowed chain of nested candidates.
    pub fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.config.max_nesting_depth = depth;
        self
    }

    /// Treat side-effect warnings as fatal.
    pub fn warnings_as_errors(mut self, enabled: bool) -> Self {
        self.config.warnings_as_errors = enabled;
        self
    }

    /// Continue past recoverable errors.
    pub fn recover_errors(mut self, enabled: bool) -> Self {
        self.config.recover_errors = enabled;
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    /// Build the configuration, validating it.
    pub fn build(self) -> Result<AnalysisConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parse an environment variable as usize.
fn parse_env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Parse an environment variable as bool.
fn parse_env_bool(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .and_then(|s| match s.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert_eq!(config.max_nesting_depth, 64);
        assert!(!config.warnings_as_errors);
        assert!(!config.recover_errors);
        assert_eq!(config.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_builder() {
        let config = AnalysisConfig::builder()
            .max_nesting_depth(8)
            .warnings_as_errors(true)
            .recover_errors(true)
            .log_level(LogLevel::Trace)
            .build()
            .unwrap();
        assert_eq!(config.max_nesting_depth, 8);
        assert!(config.warnings_as_errors);
        assert!(config.recover_errors);
        assert_eq!(config.log_level, LogLevel::Trace);
    }

    #[test]
    fn test_builder_validation() {
        let result = AnalysisConfig::builder().max_nesting_depth(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("off"), Some(LogLevel::Off));
        assert_eq!(LogLevel::from_str("ERROR"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("INFO"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("4"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("TRACE"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("loud"), None);
    }

    #[test]
    fn test_second_subscriber_is_an_error() {
        let config = AnalysisConfig::default();
        // Whichever call runs first may win; the second must not panic.
        let _ = config.init_tracing();
        assert!(config.init_tracing().is_err());
    }
}
