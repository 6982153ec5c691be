//! Listener callbacks and their identity.
//!
//! A [`Listener`] is a shared callback plus a [`ListenerId`] assigned when it
//! is created. Clones share the id, and the registry deduplicates on it:
//! registering a clone of a listener that is already present for the same
//! tag is a no-op, while two listeners built from identical closures are
//! distinct.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::event::{Event, JsonPayload};
use crate::failure::Failure;

/// What a listener returns. `Err` is redirected to the error channel.
pub type ListenerResult = Result<(), Failure>;

type Callback<P> = dyn Fn(&Event<P>) -> ListenerResult + Send + Sync;

/// Identity of a listener, shared by all of its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Create a new identifier using UUID v7 (time-ordered).
    fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A callback registered against an event type.
pub struct Listener<P = JsonPayload> {
    id: ListenerId,
    callback: Arc<Callback<P>>,
}

impl<P> Listener<P> {
    /// Wrap a fallible callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Event<P>) -> ListenerResult + Send + Sync + 'static,
    {
        Self {
            id: ListenerId::new(),
            callback: Arc::new(callback),
        }
    }

    /// Wrap a callback that never fails.
    pub fn infallible<F>(callback: F) -> Self
    where
        F: Fn(&Event<P>) + Send + Sync + 'static,
    {
        Self::new(move |event| {
            callback(event);
            Ok(())
        })
    }

    /// This listener's identity.
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Invoke the callback directly. Panics are not caught here.
    pub fn call(&self, event: &Event<P>) -> ListenerResult {
        (self.callback)(event)
    }
}

impl<P> Clone for Listener<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<P> PartialEq for Listener<P> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<P> Eq for Listener<P> {}

impl<P> fmt::Debug for Listener<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Options for [`EventTarget::add_event_listener`](crate::EventTarget::add_event_listener).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Remove the listener right after its first invocation.
    pub once: bool,
}

impl ListenerOptions {
    /// Options for a once-listener.
    pub const fn once() -> Self {
        Self { once: true }
    }
}
