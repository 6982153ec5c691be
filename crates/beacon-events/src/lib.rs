//! Typed in-process event target for Beacon.
//!
//! Callers register listeners against string event types, dispatch events
//! synchronously to the listeners of the matching type, and never see a
//! listener's failure on their own call stack.
//!
//! # Architecture
//!
//! - [`registry`] -- [`ListenerRegistry`]: event type to ordered listener
//!   records, deduplicated by listener identity.
//! - [`target`] -- [`EventTarget`]: the registry behind a mutex plus the
//!   dispatch engine and its error channel.
//! - [`event`], [`listener`], [`failure`] -- the values that flow through it.
//! - [`defer`] -- [`Defer`]: where unhandled failures surface, on a later
//!   turn.
//! - [`config`] -- [`TargetConfig`]: YAML-backed target settings.
//!
//! # Failure isolation
//!
//! | Failure | Goes to |
//! |---|---|
//! | malformed call (empty event type, bad JSON event) | [`EventError`], returned to the caller |
//! | listener `Err` or panic during `dispatch` | the `"error"` channel, as [`Event::error`] |
//! | failure with no `"error"` listener, or raised by one | surfaced on a later turn via [`Defer`] |
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use beacon_events::{Event, EventTarget, Failure, Listener, ERROR_EVENT};
//!
//! let target: EventTarget<u32> = EventTarget::new();
//! let errors = Arc::new(AtomicUsize::new(0));
//!
//! let seen = Arc::clone(&errors);
//! target
//!     .on(ERROR_EVENT, Listener::infallible(move |event: &Event<u32>| {
//!         if event.error().is_some() {
//!             seen.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }))?
//!     .on("reading", Listener::new(|event: &Event<u32>| match event.payload() {
//!         Some(&n) if n > 100 => Err(Failure::msg("out of range")),
//!         _ => Ok(()),
//!     }))?
//!     .dispatch(Event::new("reading", 7))?
//!     .dispatch(Event::new("reading", 500))?;
//!
//! assert_eq!(errors.load(Ordering::SeqCst), 1);
//! assert_eq!(target.listener_count(), 2);
//! # Ok::<(), beacon_events::EventError>(())
//! ```

pub mod config;
pub mod defer;
pub mod error;
pub mod event;
pub mod failure;
pub mod listener;
pub mod registry;
pub mod target;

// Re-export primary types at crate root.
pub use config::{ConfigError, SchedulerKind, TargetConfig, UnhandledPolicy};
pub use defer::{Defer, DeferQueue, Deferred, ThreadDefer, TokioDefer};
pub use error::EventError;
pub use event::{ERROR_EVENT, Event, EventKind, JsonPayload};
pub use failure::{Failure, ListenerPanic};
pub use listener::{Listener, ListenerId, ListenerOptions, ListenerResult};
pub use registry::{EventNames, ListenerRecord, ListenerRegistry};
pub use target::{EventTarget, EventTargetBuilder, UnhandledHook};
