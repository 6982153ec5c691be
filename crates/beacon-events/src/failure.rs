//! Failure values carried through the error channel.
//!
//! A [`Failure`] is whatever a listener raised (an `Err` return or a panic)
//! or whatever a caller passed to
//! [`EventTarget::dispatch_error`](crate::EventTarget::dispatch_error).
//! The original error value is kept behind an [`Arc`] and never re-wrapped,
//! so handlers can downcast back to the concrete type that was raised.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// A listener panicked while handling an event.
///
/// The panic payload is reduced to its message; payloads that are neither
/// `&str` nor `String` are reported as `"non-string panic payload"`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("listener panicked: {message}")]
pub struct ListenerPanic {
    /// The panic message.
    pub message: String,
}

/// A plain message failure, used by [`Failure::msg`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
struct Message(String);

/// A failure value routed through the error channel.
///
/// Cheap to clone. Converts from any `std::error::Error + Send + Sync`
/// type, which lets listeners use `?` on their own errors:
///
/// ```
/// use beacon_events::{Event, Failure};
///
/// fn parse_count(event: &Event) -> Result<(), Failure> {
///     let _n: u32 = "not a number".parse()?;
///     let _ = event;
///     Ok(())
/// }
/// # let _ = parse_count;
/// ```
#[derive(Clone)]
pub struct Failure {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

impl Failure {
    /// Wrap an error value.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    /// Build a failure from a bare message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Build a failure from an already boxed error.
    pub fn from_boxed(error: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self {
            inner: Arc::from(error),
        }
    }

    /// Build a failure from a payload caught by [`std::panic::catch_unwind`].
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| String::from("non-string panic payload"));
        Self::new(ListenerPanic { message })
    }

    /// The failure's display message.
    pub fn message(&self) -> String {
        self.inner.to_string()
    }

    /// Whether this failure came from a listener panic.
    pub fn is_panic(&self) -> bool {
        self.inner.is::<ListenerPanic>()
    }

    /// Borrow the original error as a concrete type, if it is one.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// Borrow the original error.
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    /// Whether two failures share the same underlying value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Failure").field(&self.inner).finish()
    }
}
