//! Configuration for the replay harness.
//!
//! Loads `beacon-replay.yaml` into typed structs. Every section and field
//! has a default, so a partial file (or none at all) is valid.

use std::path::Path;

use beacon_events::{ConfigError, TargetConfig};
use serde::Deserialize;

/// Default file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "beacon-replay.yaml";

/// Environment variable overriding the config file path.
pub const CONFIG_ENV_VAR: &str = "BEACON_CONFIG";

/// Top-level replay configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReplayConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Event target settings.
    #[serde(default)]
    pub target: TargetConfig,

    /// Which listeners the harness installs.
    #[serde(default)]
    pub replay: ReplaySection,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    String::from("info")
}

/// Listener setup for a replay run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplaySection {
    /// Event types that get a persistent logging listener.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Event types that get a logging listener firing only once.
    #[serde(default)]
    pub once_tags: Vec<String>,

    /// Install an error-channel listener. Without one, failures surface
    /// through the target's unhandled policy.
    #[serde(default = "default_capture_errors")]
    pub capture_errors: bool,

    /// How long to wait after the last line for deferred failures to
    /// surface, in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for ReplaySection {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            once_tags: Vec::new(),
            capture_errors: default_capture_errors(),
            settle_ms: default_settle_ms(),
        }
    }
}

const fn default_capture_errors() -> bool {
    true
}

const fn default_settle_ms() -> u64 {
    50
}

impl ReplayConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML or
    /// does not match the expected shape.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }
}
