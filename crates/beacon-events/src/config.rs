//! Configuration for building an [`EventTarget`](crate::EventTarget).
//!
//! Mirrors the `target` section of a YAML file:
//!
//! ```yaml
//! target:
//!   unhandled: log      # log | panic
//!   scheduler: tokio    # tokio | thread
//! ```
//!
//! Every field has a default, so an empty document is a valid config.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// What happens to a failure that no error-channel listener handled.
///
/// Applied on the deferred turn, never on the dispatching call stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnhandledPolicy {
    /// Emit the failure as an `error`-level tracing event.
    #[default]
    Log,
    /// Panic on the deferred turn.
    Panic,
}

/// Which [`Defer`](crate::Defer) implementation runs deferred work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    /// [`TokioDefer`](crate::TokioDefer).
    #[default]
    Tokio,
    /// [`ThreadDefer`](crate::ThreadDefer).
    Thread,
}

/// Settings for one event target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TargetConfig {
    /// Policy for unhandled failures.
    #[serde(default)]
    pub unhandled: UnhandledPolicy,

    /// Where deferred work runs.
    #[serde(default)]
    pub scheduler: SchedulerKind,
}

impl TargetConfig {
    /// Load the `target` section from a YAML file.
    ///
    /// A file without a `target` key yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse the `target` section from a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML or the
    /// section has unknown values.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct Document {
            #[serde(default)]
            target: TargetConfig,
        }

        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: Document = serde_yml::from_str(yaml)?;
        Ok(document.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = TargetConfig::parse("").ok();
        assert_eq!(config, Some(TargetConfig::default()));
        assert_eq!(TargetConfig::default().unhandled, UnhandledPolicy::Log);
        assert_eq!(TargetConfig::default().scheduler, SchedulerKind::Tokio);
    }

    #[test]
    fn parses_target_section() {
        let yaml = "target:\n  unhandled: panic\n  scheduler: thread\n";
        let config = TargetConfig::parse(yaml).ok();
        assert_eq!(
            config,
            Some(TargetConfig {
                unhandled: UnhandledPolicy::Panic,
                scheduler: SchedulerKind::Thread,
            })
        );
    }

    #[test]
    fn other_sections_are_ignored() {
        let yaml = "logging:\n  level: debug\ntarget:\n  scheduler: thread\n";
        let config = TargetConfig::parse(yaml).ok();
        assert_eq!(config.map(|c| c.scheduler), Some(SchedulerKind::Thread));
        assert_eq!(config.map(|c| c.unhandled), Some(UnhandledPolicy::Log));
    }

    #[test]
    fn unknown_policy_is_an_error() {
        let result = TargetConfig::parse("target:\n  unhandled: shrug\n");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = TargetConfig::from_file(Path::new("/nonexistent/beacon.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
