//! Error types for the replay harness binary.
//!
//! [`ReplayError`] wraps every failure mode `main` can propagate with `?`.

use beacon_events::{ConfigError, EventError};

/// Top-level error for the replay harness.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Opening or reading the event input failed.
    #[error("input error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The event target rejected a call (for example an empty event type
    /// in the listener setup).
    #[error("target error: {source}")]
    Target {
        /// The underlying target error.
        #[from]
        source: EventError,
    },
}
