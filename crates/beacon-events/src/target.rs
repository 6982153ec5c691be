//! The event target: registry facade plus the dispatch engine.
//!
//! [`EventTarget`] owns one [`ListenerRegistry`] behind a mutex and delivers
//! events to it synchronously, on the caller's stack.
//!
//! # Dispatch protocol
//!
//! ```text
//! dispatch(event)
//!   ├─► reject empty event type (EventError, returned to caller)
//!   ├─► lock ─► snapshot bucket[event.type] ─► unlock
//!   │      └─ no bucket ─► return (no-op)
//!   └─► for record in snapshot (registration order):
//!          ├─► record.once ─► claim it; already claimed ─► skip
//!          ├─► call listener (lock NOT held; panics caught)
//!          ├─► record.once ─► remove record from the live registry
//!          └─► Err(failure) ─► dispatch_error(failure)
//!
//! dispatch_error(failure)
//!   ├─► no "error" bucket ─► defer(surface failure)
//!   └─► same loop over the "error" snapshot, except:
//!          └─► Err(nested) ─► defer(surface nested)   (never re-enters the channel)
//! ```
//!
//! Listeners registered or removed while a dispatch is running only affect
//! later dispatches. Neither `dispatch` nor `dispatch_error` ever raises the
//! failure it was asked to deliver; unhandled failures are surfaced on a
//! later turn through the configured [`Defer`].

use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::config::{SchedulerKind, TargetConfig, UnhandledPolicy};
use crate::defer::{Defer, ThreadDefer, TokioDefer};
use crate::error::{EventError, require_event_type};
use crate::event::{ERROR_EVENT, Event, JsonPayload};
use crate::failure::Failure;
use crate::listener::{Listener, ListenerOptions, ListenerResult};
use crate::registry::{EventNames, ListenerRecord, ListenerRegistry};

/// Callback receiving unhandled failures on the deferred turn.
pub type UnhandledHook = Arc<dyn Fn(Failure) + Send + Sync>;

/// Where an unhandled failure ends up.
#[derive(Clone)]
enum UnhandledSink {
    Policy(UnhandledPolicy),
    Hook(UnhandledHook),
}

impl UnhandledSink {
    fn report(&self, failure: Failure) {
        match self {
            Self::Policy(UnhandledPolicy::Log) => {
                error!(
                    error = %failure,
                    panic = failure.is_panic(),
                    "unhandled event target failure"
                );
            }
            // Crash-equivalent: the panic happens on the deferred turn only.
            #[allow(clippy::panic)]
            Self::Policy(UnhandledPolicy::Panic) => {
                panic!("unhandled event target failure: {failure}");
            }
            Self::Hook(hook) => hook(failure),
        }
    }
}

impl fmt::Debug for UnhandledSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Policy(policy) => f.debug_tuple("Policy").field(policy).finish(),
            Self::Hook(_) => f.write_str("Hook"),
        }
    }
}

/// Builder for an [`EventTarget`] with a custom scheduler or unhandled
/// failure handling.
pub struct EventTargetBuilder<P> {
    defer: Option<Arc<dyn Defer>>,
    policy: UnhandledPolicy,
    hook: Option<UnhandledHook>,
    payload: PhantomData<fn() -> P>,
}

impl<P> EventTargetBuilder<P> {
    fn new() -> Self {
        Self {
            defer: None,
            policy: UnhandledPolicy::default(),
            hook: None,
            payload: PhantomData,
        }
    }

    /// Apply a [`TargetConfig`]: scheduler and unhandled policy.
    #[must_use]
    pub fn config(mut self, config: TargetConfig) -> Self {
        let defer: Arc<dyn Defer> = match config.scheduler {
            SchedulerKind::Tokio => Arc::new(TokioDefer),
            SchedulerKind::Thread => Arc::new(ThreadDefer),
        };
        self.defer = Some(defer);
        self.policy = config.unhandled;
        self
    }

    /// Run deferred work on `defer`.
    #[must_use]
    pub fn defer(mut self, defer: Arc<dyn Defer>) -> Self {
        self.defer = Some(defer);
        self
    }

    /// Set the policy for unhandled failures. Ignored once a hook is set.
    #[must_use]
    pub fn unhandled_policy(mut self, policy: UnhandledPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Hand unhandled failures to `hook` instead of applying a policy.
    #[must_use]
    pub fn on_unhandled<F>(mut self, hook: F) -> Self
    where
        F: Fn(Failure) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Build the target.
    pub fn build(self) -> EventTarget<P> {
        let unhandled = match self.hook {
            Some(hook) => UnhandledSink::Hook(hook),
            None => UnhandledSink::Policy(self.policy),
        };
        EventTarget {
            registry: Mutex::new(ListenerRegistry::new()),
            defer: self.defer.unwrap_or_else(|| Arc::new(TokioDefer)),
            unhandled,
        }
    }
}

impl<P> fmt::Debug for EventTargetBuilder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTargetBuilder")
            .field("custom_defer", &self.defer.is_some())
            .field("policy", &self.policy)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

/// A typed, synchronous event target.
///
/// All methods take `&self`; the registry is guarded by a mutex that is
/// never held while a listener runs, so listeners may register, remove, or
/// dispatch on the same target. Mutating methods return `&Self` so calls
/// can be chained.
///
/// Two naming conventions are provided for the same operations:
///
/// | Operation | Aliases |
/// |---|---|
/// | [`register`](Self::register) | [`on`](Self::on), [`once`](Self::once), [`add_event_listener`](Self::add_event_listener) |
/// | [`unregister`](Self::unregister) | [`off`](Self::off), [`remove_event_listener`](Self::remove_event_listener) |
/// | [`unregister_all`](Self::unregister_all) | [`remove_all_listeners`](Self::remove_all_listeners) |
/// | [`dispatch`](Self::dispatch) | [`dispatch_event`](Self::dispatch_event) |
/// | [`tags_with_listeners`](Self::tags_with_listeners) | [`event_names`](Self::event_names) |
pub struct EventTarget<P = JsonPayload> {
    registry: Mutex<ListenerRegistry<P>>,
    defer: Arc<dyn Defer>,
    unhandled: UnhandledSink,
}

impl<P> EventTarget<P> {
    /// Create a target that defers onto tokio and logs unhandled failures.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a target from configuration.
    pub fn from_config(config: TargetConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Start building a target.
    pub fn builder() -> EventTargetBuilder<P> {
        EventTargetBuilder::new()
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Register `listener` for `event_type`.
    ///
    /// Registering a listener that is already present for `event_type` is a
    /// no-op; the existing registration keeps its `once` flag.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyEventType`] if `event_type` is empty.
    pub fn register(
        &self,
        event_type: &str,
        listener: Listener<P>,
        once: bool,
    ) -> Result<&Self, EventError> {
        let listener_id = listener.id();
        let inserted = self.registry.lock().register(event_type, listener, once)?;
        if inserted {
            debug!(event_type, listener = %listener_id, once, "listener registered");
        } else {
            trace!(event_type, listener = %listener_id, "listener already registered");
        }
        Ok(self)
    }

    /// Register a persistent listener.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyEventType`] if `event_type` is empty.
    pub fn on(&self, event_type: &str, listener: Listener<P>) -> Result<&Self, EventError> {
        self.register(event_type, listener, false)
    }

    /// Register a listener that is removed after its first invocation.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyEventType`] if `event_type` is empty.
    pub fn once(&self, event_type: &str, listener: Listener<P>) -> Result<&Self, EventError> {
        self.register(event_type, listener, true)
    }

    /// Register a listener with [`ListenerOptions`].
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyEventType`] if `event_type` is empty.
    pub fn add_event_listener(
        &self,
        event_type: &str,
        listener: Listener<P>,
        options: ListenerOptions,
    ) -> Result<&Self, EventError> {
        self.register(event_type, listener, options.once)
    }

    /// Remove `listener` from `event_type`. Removing a listener that is not
    /// registered succeeds silently.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyEventType`] if `event_type` is empty.
    pub fn unregister(&self, event_type: &str, listener: &Listener<P>) -> Result<&Self, EventError> {
        let removed = self.registry.lock().unregister(event_type, listener.id())?;
        if removed {
            debug!(event_type, listener = %listener.id(), "listener unregistered");
        }
        Ok(self)
    }

    /// Alias of [`unregister`](Self::unregister).
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyEventType`] if `event_type` is empty.
    pub fn off(&self, event_type: &str, listener: &Listener<P>) -> Result<&Self, EventError> {
        self.unregister(event_type, listener)
    }

    /// Alias of [`unregister`](Self::unregister).
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyEventType`] if `event_type` is empty.
    pub fn remove_event_listener(
        &self,
        event_type: &str,
        listener: &Listener<P>,
    ) -> Result<&Self, EventError> {
        self.unregister(event_type, listener)
    }

    /// Remove every listener for `event_type`, or every listener at all
    /// when `None`.
    pub fn unregister_all(&self, event_type: Option<&str>) -> &Self {
        let removed = self.registry.lock().clear(event_type);
        debug!(event_type = event_type.unwrap_or("*"), removed, "listeners cleared");
        self
    }

    /// Alias of [`unregister_all`](Self::unregister_all).
    pub fn remove_all_listeners(&self, event_type: Option<&str>) -> &Self {
        self.unregister_all(event_type)
    }

    /// Total number of registrations across all event types.
    pub fn listener_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Number of registrations for `event_type`.
    pub fn listener_count_for(&self, event_type: &str) -> usize {
        self.registry.lock().count_for(event_type)
    }

    /// Whether any listener is registered for `event_type`.
    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.listener_count_for(event_type) > 0
    }

    /// Event types holding at least one listener, in the order they first
    /// got one.
    pub fn tags_with_listeners(&self) -> EventNames {
        self.registry.lock().event_names()
    }

    /// Alias of [`tags_with_listeners`](Self::tags_with_listeners).
    pub fn event_names(&self) -> EventNames {
        self.tags_with_listeners()
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Deliver `event` to the listeners registered for its type.
    ///
    /// Listener failures (errors and panics) are redirected to
    /// [`dispatch_error`](Self::dispatch_error) and never returned here.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyEventType`] if the event type is empty.
    pub fn dispatch(&self, event: Event<P>) -> Result<&Self, EventError> {
        let event_type = event.event_type();
        require_event_type(event_type, "dispatch")?;

        let snapshot = self.registry.lock().snapshot(event_type);
        let Some(records) = snapshot else {
            trace!(event_type, "no listeners for event");
            return Ok(self);
        };

        trace!(event_type, listeners = records.len(), "dispatching event");
        for record in &records {
            if let Err(failure) = self.invoke(event_type, record, &event) {
                warn!(
                    event_type,
                    listener = %record.listener().id(),
                    error = %failure,
                    "listener failed, redirecting to error channel"
                );
                self.dispatch_error(failure);
            }
        }
        Ok(self)
    }

    /// Alias of [`dispatch`](Self::dispatch).
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyEventType`] if the event type is empty.
    pub fn dispatch_event(&self, event: Event<P>) -> Result<&Self, EventError> {
        self.dispatch(event)
    }

    /// Deliver `failure` on the error channel.
    ///
    /// With no `"error"` listener registered, the failure is surfaced on a
    /// later turn. A failure raised by an error listener is surfaced the same
    /// way instead of being dispatched again.
    pub fn dispatch_error(&self, failure: impl Into<Failure>) -> &Self {
        let failure = failure.into();

        let snapshot = self.registry.lock().snapshot(ERROR_EVENT);
        let Some(records) = snapshot else {
            debug!(error = %failure, "no error listeners, deferring failure");
            self.surface(failure);
            return self;
        };

        let event = Event::from_failure(failure);
        for record in &records {
            if let Err(nested) = self.invoke(ERROR_EVENT, record, &event) {
                warn!(
                    listener = %record.listener().id(),
                    error = %nested,
                    "error listener failed, deferring failure"
                );
                self.surface(nested);
            }
        }
        self
    }

    /// Run one listener and retire its record if it was a once-record.
    ///
    /// A once-record already claimed by an overlapping dispatch is skipped.
    fn invoke(&self, event_type: &str, record: &ListenerRecord<P>, event: &Event<P>) -> ListenerResult {
        if !record.claim() {
            trace!(
                event_type,
                listener = %record.listener().id(),
                "once-listener already fired, skipping"
            );
            return Ok(());
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| record.listener().call(event)))
            .unwrap_or_else(|payload| Err(Failure::from_panic(payload.as_ref())));

        if record.once() {
            self.registry.lock().remove_record(event_type, record.serial());
        }
        outcome
    }

    /// Surface `failure` on a later turn.
    fn surface(&self, failure: Failure) {
        let sink = self.unhandled.clone();
        self.defer.defer(Box::new(move || sink.report(failure)));
    }
}

impl<P> Default for EventTarget<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for EventTarget<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("registry", &*self.registry.lock())
            .field("unhandled", &self.unhandled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::defer::DeferQueue;

    type Log = Arc<Mutex<Vec<String>>>;

    /// A target whose deferred work waits on `queue`, reporting unhandled
    /// failures into `unhandled`.
    fn queued_target() -> (EventTarget<u32>, Arc<DeferQueue>, Log) {
        let queue = Arc::new(DeferQueue::new());
        let unhandled: Log = Arc::default();
        let sink = Arc::clone(&unhandled);
        let target = EventTarget::builder()
            .defer(Arc::clone(&queue) as Arc<dyn Defer>)
            .on_unhandled(move |failure| sink.lock().push(failure.message()))
            .build();
        (target, queue, unhandled)
    }

    fn recorder(log: &Log, name: &'static str) -> Listener<u32> {
        let log = Arc::clone(log);
        Listener::infallible(move |_| log.lock().push(name.to_owned()))
    }

    fn event(n: u32) -> Event<u32> {
        Event::new("x", n)
    }

    #[test]
    fn target_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EventTarget<u32>>();
        assert_send_sync::<EventTarget>();
    }

    #[test]
    fn calls_chain() {
        let (target, _, _) = queued_target();
        let log: Log = Arc::default();
        let a = recorder(&log, "a");
        let result = target
            .on("x", a.clone())
            .and_then(|t| t.on("y", recorder(&log, "b")))
            .and_then(|t| t.dispatch(event(1)))
            .and_then(|t| t.off("x", &a))
            .map(|t| t.listener_count());
        assert_eq!(result, Ok(1));
        assert_eq!(*log.lock(), vec!["a"]);
    }

    #[test]
    fn aliases_share_the_registry() {
        let (target, _, _) = queued_target();
        let log: Log = Arc::default();
        let f = recorder(&log, "f");

        let _ = target.add_event_listener("x", f.clone(), ListenerOptions::default());
        let _ = target.on("x", f.clone());
        assert_eq!(target.listener_count(), 1);

        let _ = target.remove_event_listener("x", &f);
        assert_eq!(target.listener_count(), 0);

        let _ = target.add_event_listener("x", f.clone(), ListenerOptions::once());
        let _ = target.dispatch_event(event(1));
        let _ = target.dispatch_event(event(2));
        assert_eq!(*log.lock(), vec!["f"]);
        assert!(!target.has_listeners("x"));

        let _ = target.on("x", f.clone());
        let _ = target.on("y", f);
        assert_eq!(target.event_names(), target.tags_with_listeners());
        let _ = target.remove_all_listeners(Some("x"));
        assert_eq!(target.listener_count(), 1);
        let _ = target.remove_all_listeners(None);
        assert_eq!(target.listener_count(), 0);
    }

    #[test]
    fn empty_event_type_is_rejected_everywhere() {
        let (target, _, _) = queued_target();
        let f: Listener<u32> = Listener::infallible(|_| {});
        assert!(target.on("", f.clone()).is_err());
        assert!(target.once("", f.clone()).is_err());
        assert!(target.off("", &f).is_err());
        assert_eq!(
            target.dispatch(Event::new("", 0)).err(),
            Some(EventError::EmptyEventType {
                operation: "dispatch"
            })
        );
    }

    #[test]
    fn dispatch_without_listeners_is_a_no_op() {
        let (target, queue, unhandled) = queued_target();
        let _ = target.on("y", Listener::infallible(|_| {}));
        assert!(target.dispatch(event(1)).is_ok());
        assert_eq!(target.listener_count(), 1);
        assert_eq!(queue.pending(), 0);
        assert!(unhandled.lock().is_empty());
    }

    #[test]
    fn listener_receives_the_event_unchanged() {
        let (target, _, _) = queued_target();
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let _ = target.on(
            "x",
            Listener::infallible(move |e: &Event<u32>| {
                *slot.lock() = Some((e.event_type().to_owned(), e.time_stamp(), e.payload().copied()));
            }),
        );
        let _ = target.dispatch(event(9).with_time_stamp(77));
        assert_eq!(*seen.lock(), Some((String::from("x"), 77, Some(9))));
    }

    #[test]
    fn listener_added_mid_dispatch_waits_for_the_next_dispatch() {
        let target = Arc::new(queued_target().0);
        let log: Log = Arc::default();
        let late = recorder(&log, "late");

        let weak: Weak<EventTarget<u32>> = Arc::downgrade(&target);
        let adder_log = Arc::clone(&log);
        let _ = target.on(
            "x",
            Listener::infallible(move |_| {
                adder_log.lock().push(String::from("adder"));
                if let Some(target) = weak.upgrade() {
                    let _ = target.on("x", late.clone());
                }
            }),
        );

        let _ = target.dispatch(event(1));
        assert_eq!(*log.lock(), vec!["adder"]);
        let _ = target.dispatch(event(2));
        assert_eq!(*log.lock(), vec!["adder", "adder", "late"]);
    }

    #[test]
    fn listener_removed_mid_dispatch_still_runs_this_time() {
        let target = Arc::new(queued_target().0);
        let log: Log = Arc::default();
        let victim = recorder(&log, "victim");

        let weak = Arc::downgrade(&target);
        let remover_victim = victim.clone();
        let _ = target.on(
            "x",
            Listener::infallible(move |_| {
                if let Some(target) = weak.upgrade() {
                    let _ = target.off("x", &remover_victim);
                }
            }),
        );
        let _ = target.on("x", victim);

        let _ = target.dispatch(event(1));
        assert_eq!(*log.lock(), vec!["victim"]);
        let _ = target.dispatch(event(2));
        assert_eq!(*log.lock(), vec!["victim"]);
    }

    #[test]
    fn nested_dispatch_from_a_listener() {
        let target = Arc::new(queued_target().0);
        let log: Log = Arc::default();
        let _ = target.on("y", recorder(&log, "y"));

        let weak = Arc::downgrade(&target);
        let _ = target.on(
            "x",
            Listener::infallible(move |_| {
                if let Some(target) = weak.upgrade() {
                    let _ = target.dispatch(Event::new("y", 0));
                }
            }),
        );
        let _ = target.dispatch(event(1));
        assert_eq!(*log.lock(), vec!["y"]);
    }

    #[test]
    fn once_record_is_removed_even_when_it_fails() {
        let (target, queue, unhandled) = queued_target();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _ = target.once(
            "x",
            Listener::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Failure::msg("nope"))
            }),
        );

        let _ = target.dispatch(event(1));
        let _ = target.dispatch(event(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(target.listener_count(), 0);

        assert_eq!(queue.run_pending(), 1);
        assert_eq!(*unhandled.lock(), vec!["nope"]);
    }

    #[test]
    fn reregistered_listener_survives_its_old_once_record() {
        let target = Arc::new(queued_target().0);
        let hits = Arc::new(AtomicUsize::new(0));

        // On its first firing, the once-listener swaps its own registration
        // for a persistent one. Retiring the old once-record must not touch
        // the new registration.
        let slot: Arc<Mutex<Option<Listener<u32>>>> = Arc::default();
        let me = Arc::clone(&slot);
        let weak = Arc::downgrade(&target);
        let counter = Arc::clone(&hits);
        let listener = Listener::infallible(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            let this = me.lock().clone();
            if let (Some(target), Some(this)) = (weak.upgrade(), this) {
                let _ = target.off("x", &this);
                let _ = target.on("x", this);
            }
        });
        *slot.lock() = Some(listener.clone());

        let _ = target.once("x", listener);
        let _ = target.dispatch(event(1));
        assert_eq!(target.listener_count(), 1);
        let _ = target.dispatch(event(2));
        let _ = target.dispatch(event(3));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(target.listener_count(), 1);
    }

    #[test]
    fn once_listener_fires_once_across_nested_dispatch() {
        let target = Arc::new(queued_target().0);
        let log: Log = Arc::default();

        // The outer dispatch snapshots [reentrant, once]; the nested
        // dispatch snapshots the same once-record before it is retired.
        let weak = Arc::downgrade(&target);
        let nested = Arc::new(AtomicUsize::new(0));
        let depth = Arc::clone(&nested);
        let _ = target.on(
            "x",
            Listener::infallible(move |_| {
                if depth.fetch_add(1, Ordering::SeqCst) > 0 {
                    return;
                }
                if let Some(target) = weak.upgrade() {
                    let _ = target.dispatch(event(2));
                }
            }),
        );
        let _ = target.once("x", recorder(&log, "once"));

        let _ = target.dispatch(event(1));
        assert_eq!(*log.lock(), vec!["once"]);
        assert_eq!(nested.load(Ordering::SeqCst), 2);
        assert_eq!(target.listener_count(), 1);
    }

    #[test]
    #[allow(clippy::panic)]
    fn panicking_listener_is_isolated() {
        let (target, _, _) = queued_target();
        let log: Log = Arc::default();
        let errors: Log = Arc::default();
        let sink = Arc::clone(&errors);

        let _ = target.on(ERROR_EVENT, Listener::infallible(move |e: &Event<u32>| {
            if let Some(failure) = e.error() {
                sink.lock().push(failure.message());
            }
        }));
        let _ = target.on("x", Listener::infallible(|_| panic!("kaboom")));
        let _ = target.on("x", recorder(&log, "after"));

        assert!(target.dispatch(event(1)).is_ok());
        assert_eq!(*log.lock(), vec!["after"]);
        assert_eq!(*errors.lock(), vec!["listener panicked: kaboom"]);
    }

    #[test]
    fn error_listener_failure_is_deferred_not_redispatched() {
        let (target, queue, unhandled) = queued_target();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _ = target.on(
            ERROR_EVENT,
            Listener::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Failure::msg("error handler broke"))
            }),
        );

        let _ = target.dispatch_error(Failure::msg("original"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(unhandled.lock().is_empty());

        assert_eq!(queue.run_pending(), 1);
        assert_eq!(*unhandled.lock(), vec!["error handler broke"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unhandled_failure_keeps_the_original_value() {
        #[derive(Debug, thiserror::Error)]
        #[error("quota exceeded")]
        struct Quota;

        let queue = Arc::new(DeferQueue::new());
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let target: EventTarget<u32> = EventTarget::builder()
            .defer(Arc::clone(&queue) as Arc<dyn Defer>)
            .on_unhandled(move |failure| *slot.lock() = Some(failure))
            .build();

        let _ = target.dispatch_error(Quota);
        assert!(seen.lock().is_none());
        let _ = queue.run_pending();
        let is_quota = seen
            .lock()
            .as_ref()
            .is_some_and(|failure| failure.downcast_ref::<Quota>().is_some());
        assert!(is_quota);
    }

    #[test]
    fn panic_policy_panics_on_the_deferred_turn() {
        let queue = Arc::new(DeferQueue::new());
        let target: EventTarget<u32> = EventTarget::builder()
            .defer(Arc::clone(&queue) as Arc<dyn Defer>)
            .unhandled_policy(UnhandledPolicy::Panic)
            .build();

        // Reporting itself never panics.
        let _ = target.dispatch_error(Failure::msg("fatal"));
        let turn = panic::catch_unwind(AssertUnwindSafe(|| queue.run_pending()));
        assert!(turn.is_err());
    }

    #[test]
    fn log_policy_swallows_after_logging() {
        let queue = Arc::new(DeferQueue::new());
        let target: EventTarget<u32> = EventTarget::builder()
            .defer(Arc::clone(&queue) as Arc<dyn Defer>)
            .build();
        let _ = target.dispatch_error(Failure::msg("logged"));
        assert_eq!(queue.run_pending(), 1);
    }

    #[test]
    fn debug_output_lists_buckets() {
        let (target, _, _) = queued_target();
        let _ = target.on("x", Listener::infallible(|_| {}));
        let rendered = format!("{target:?}");
        assert!(rendered.contains("\"x\": 1"));
        assert!(rendered.contains("Hook"));
    }
}
