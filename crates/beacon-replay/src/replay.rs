//! Line-by-line replay of newline-delimited JSON events.
//!
//! Each non-blank input line is parsed with [`Event::parse`] and dispatched
//! through the target. A line that does not parse is not fatal: it is
//! counted as rejected and reported on the target's error channel as a
//! [`RejectedLine`].

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use beacon_events::{ERROR_EVENT, Event, EventError, EventTarget, Failure, Listener};
use tracing::{debug, info, warn};

use crate::config::ReplaySection;
use crate::error::ReplayError;

/// An input line that could not be turned into an event.
#[derive(Debug, Clone, thiserror::Error)]
#[error("line {line}: {source}")]
pub struct RejectedLine {
    /// 1-based line number in the input.
    pub line: u64,
    /// Why the line was rejected.
    pub source: EventError,
}

/// Counters for one [`Replayer::replay`] call.
///
/// Every field counts only what happened during that call, including the
/// listener-side `delivered` and `errors` counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Non-blank lines read.
    pub lines: u64,
    /// Lines dispatched as events.
    pub dispatched: u64,
    /// Lines rejected as malformed.
    pub rejected: u64,
    /// Listener invocations on the configured tags.
    pub delivered: u64,
    /// Failures seen by the error-channel listener.
    pub errors: u64,
}

/// Counters updated from inside listeners.
#[derive(Debug, Default)]
struct ListenerCounters {
    delivered: AtomicU64,
    errors: AtomicU64,
}

/// Drives events from a reader into an [`EventTarget`].
#[derive(Debug)]
pub struct Replayer {
    target: EventTarget,
    counters: Arc<ListenerCounters>,
}

impl Replayer {
    /// Install the listeners described by `section` on `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Target`] if a configured event type is empty.
    pub fn new(target: EventTarget, section: &ReplaySection) -> Result<Self, ReplayError> {
        let counters = Arc::new(ListenerCounters::default());

        for tag in &section.tags {
            target.on(tag, delivery_listener(&counters, false))?;
        }
        for tag in &section.once_tags {
            target.once(tag, delivery_listener(&counters, true))?;
        }
        if section.capture_errors {
            target.on(ERROR_EVENT, error_listener(&counters))?;
        }

        debug!(
            tags = section.tags.len(),
            once_tags = section.once_tags.len(),
            capture_errors = section.capture_errors,
            "replay listeners installed"
        );
        Ok(Self { target, counters })
    }

    /// The target events are dispatched through.
    pub const fn target(&self) -> &EventTarget {
        &self.target
    }

    /// Replay every line of `reader`.
    ///
    /// The returned counters cover this call only; calling `replay` again
    /// starts from zero.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Io`] if reading from `reader` fails.
    pub fn replay<R: BufRead>(&self, reader: R) -> Result<ReplayStats, ReplayError> {
        let mut stats = ReplayStats::default();
        let mut line_number: u64 = 0;
        let delivered_before = self.counters.delivered.load(Ordering::Relaxed);
        let errors_before = self.counters.errors.load(Ordering::Relaxed);

        for line in reader.lines() {
            let line = line?;
            line_number = line_number.saturating_add(1);
            if line.trim().is_empty() {
                continue;
            }
            stats.lines = stats.lines.saturating_add(1);

            let outcome = Event::parse(&line).and_then(|event| self.target.dispatch(event).map(|_| ()));
            match outcome {
                Ok(()) => stats.dispatched = stats.dispatched.saturating_add(1),
                Err(source) => {
                    stats.rejected = stats.rejected.saturating_add(1);
                    warn!(line = line_number, error = %source, "rejected input line");
                    self.target.dispatch_error(RejectedLine {
                        line: line_number,
                        source,
                    });
                }
            }
        }

        stats.delivered = self
            .counters
            .delivered
            .load(Ordering::Relaxed)
            .saturating_sub(delivered_before);
        stats.errors = self
            .counters
            .errors
            .load(Ordering::Relaxed)
            .saturating_sub(errors_before);
        info!(
            lines = stats.lines,
            dispatched = stats.dispatched,
            rejected = stats.rejected,
            delivered = stats.delivered,
            errors = stats.errors,
            "replay finished"
        );
        Ok(stats)
    }
}

fn delivery_listener(counters: &Arc<ListenerCounters>, once: bool) -> Listener {
    let counters = Arc::clone(counters);
    Listener::infallible(move |event: &Event| {
        counters.delivered.fetch_add(1, Ordering::Relaxed);
        info!(
            event_type = event.event_type(),
            time_stamp = event.time_stamp(),
            fields = event.payload().map_or(0, serde_json::Map::len),
            once,
            "event delivered"
        );
    })
}

fn error_listener(counters: &Arc<ListenerCounters>) -> Listener {
    let counters = Arc::clone(counters);
    Listener::infallible(move |event: &Event| {
        counters.errors.fetch_add(1, Ordering::Relaxed);
        let message = event.error().map(Failure::message).unwrap_or_default();
        warn!(error = %message, "error channel");
    })
}
