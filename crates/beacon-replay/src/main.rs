//! Replay harness for Beacon event targets.
//!
//! Reads newline-delimited JSON events from a file (first argument) or from
//! stdin, and dispatches each one through an [`EventTarget`] built from
//! configuration. Logging listeners are installed on the configured event
//! types; malformed lines are reported on the target's error channel.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `beacon-replay.yaml` (or `BEACON_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the event target from the `target` section
//! 4. Install replay listeners from the `replay` section
//! 5. Replay the input
//! 6. Wait for deferred failures to surface, then exit

mod config;
mod error;
mod replay;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::time::Duration;

use beacon_events::EventTarget;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{CONFIG_ENV_VAR, DEFAULT_CONFIG_FILE, ReplayConfig};
use crate::error::ReplayError;
use crate::replay::Replayer;

/// Application entry point for the replay harness.
///
/// # Errors
///
/// Returns an error if configuration, listener setup, or reading the input
/// fails.
#[tokio::main]
async fn main() -> Result<(), ReplayError> {
    // 1. Load configuration. Logging is not up yet, so remember whether
    //    defaults were used and report it after step 2.
    let (config, config_path) = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("beacon-replay starting");
    match &config_path {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }

    // 3. Build the event target.
    let target = EventTarget::from_config(config.target);
    info!(
        unhandled = ?config.target.unhandled,
        scheduler = ?config.target.scheduler,
        "Event target initialized"
    );

    // 4. Install listeners.
    let replayer = Replayer::new(target, &config.replay)?;
    info!(
        listeners = replayer.target().listener_count(),
        "Replay listeners installed"
    );

    // 5. Replay the input.
    let stats = match std::env::args_os().nth(1) {
        Some(path) => {
            let path = PathBuf::from(path);
            info!(path = %path.display(), "Replaying events from file");
            replayer.replay(BufReader::new(File::open(&path)?))?
        }
        None => {
            info!("Replaying events from stdin");
            replayer.replay(io::stdin().lock())?
        }
    };

    // 6. Let deferred failures surface before the runtime shuts down.
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(config.replay.settle_ms)).await;

    info!(
        lines = stats.lines,
        rejected = stats.rejected,
        remaining_listeners = replayer.target().listener_count(),
        "beacon-replay finished"
    );
    Ok(())
}

/// Load configuration from `BEACON_CONFIG` or `beacon-replay.yaml`.
///
/// An explicit `BEACON_CONFIG` path must exist. The default file is
/// optional; when it is missing, defaults are used and the returned path is
/// `None`.
fn load_config() -> Result<(ReplayConfig, Option<PathBuf>), ReplayError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path);
        let config = ReplayConfig::from_file(&path)?;
        return Ok((config, Some(path)));
    }

    let path = PathBuf::from(DEFAULT_CONFIG_FILE);
    if path.exists() {
        let config = ReplayConfig::from_file(&path)?;
        Ok((config, Some(path)))
    } else {
        Ok((ReplayConfig::default(), None))
    }
}
