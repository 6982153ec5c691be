//! The listener registry: event type to ordered listener records.
//!
//! [`ListenerRegistry`] is the only mutable state of an event target. It is
//! a plain single-owner structure; [`EventTarget`](crate::EventTarget) wraps
//! it in a mutex and never holds that lock while a listener runs.
//!
//! # Invariants
//!
//! - Records within a bucket are kept in registration order, which is the
//!   delivery order.
//! - A bucket holds at most one record per [`ListenerId`].
//! - An event type never maps to an empty bucket: the bucket is removed
//!   together with its last record. A bucket created again later is placed
//!   after every existing one.
//! - Every record gets a serial number that is never reused, so a record
//!   removed and registered again is a new record.
//! - A once-record can be claimed exactly once. The claim flag is shared by
//!   every snapshot copy of the record, so overlapping dispatches (nested or
//!   from other threads) cannot run it twice.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;

use crate::error::{EventError, require_event_type};
use crate::listener::{Listener, ListenerId};

/// One registration of a listener against an event type.
pub struct ListenerRecord<P> {
    serial: u64,
    listener: Listener<P>,
    once: bool,
    claimed: Arc<AtomicBool>,
}

impl<P> ListenerRecord<P> {
    /// Registration serial, unique within the owning registry.
    pub const fn serial(&self) -> u64 {
        self.serial
    }

    /// The registered listener.
    pub const fn listener(&self) -> &Listener<P> {
        &self.listener
    }

    /// Whether the record is removed after its first invocation.
    pub const fn once(&self) -> bool {
        self.once
    }

    /// Take the right to invoke this record.
    ///
    /// Always `true` for persistent records. For a once-record, `true` is
    /// returned to exactly one caller across all copies of the record.
    pub fn claim(&self) -> bool {
        !self.once || !self.claimed.swap(true, Ordering::AcqRel)
    }
}

impl<P> Clone for ListenerRecord<P> {
    fn clone(&self) -> Self {
        Self {
            serial: self.serial,
            listener: self.listener.clone(),
            once: self.once,
            claimed: Arc::clone(&self.claimed),
        }
    }
}

impl<P> fmt::Debug for ListenerRecord<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRecord")
            .field("serial", &self.serial)
            .field("listener", &self.listener.id())
            .field("once", &self.once)
            .field("claimed", &self.claimed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Event types that held at least one listener when the names were taken,
/// in the order their buckets were created.
///
/// This is a point-in-time copy, not a live view: listeners registered or
/// removed afterwards are not reflected. It can be iterated any number of
/// times, and each iteration restarts from the first name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventNames {
    names: Vec<Arc<str>>,
}

impl EventNames {
    /// Iterate the event types.
    pub fn iter(&self) -> EventNamesIter<'_> {
        EventNamesIter {
            inner: self.names.iter(),
        }
    }

    /// Number of event types.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no event type holds a listener.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether `event_type` is among the names.
    pub fn contains(&self, event_type: &str) -> bool {
        self.iter().any(|name| name == event_type)
    }
}

impl<'a> IntoIterator for &'a EventNames {
    type Item = &'a str;
    type IntoIter = EventNamesIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Borrowing iterator over [`EventNames`].
#[derive(Debug, Clone)]
pub struct EventNamesIter<'a> {
    inner: std::slice::Iter<'a, Arc<str>>,
}

impl<'a> Iterator for EventNamesIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(AsRef::as_ref)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for EventNamesIter<'_> {}

/// Mapping from event type to the ordered records registered for it.
pub struct ListenerRegistry<P> {
    buckets: IndexMap<Arc<str>, Vec<ListenerRecord<P>>>,
    next_serial: u64,
}

impl<P> ListenerRegistry<P> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            buckets: IndexMap::new(),
            next_serial: 0,
        }
    }

    /// Append `listener` to the bucket for `event_type`.
    ///
    /// Returns `Ok(false)` without touching the registry if the same
    /// listener is already registered for `event_type`; the `once` flag of
    /// the existing record is kept.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyEventType`] if `event_type` is empty.
    pub fn register(
        &mut self,
        event_type: &str,
        listener: Listener<P>,
        once: bool,
    ) -> Result<bool, EventError> {
        require_event_type(event_type, "register")?;

        if self
            .buckets
            .get(event_type)
            .is_some_and(|bucket| bucket.iter().any(|r| r.listener.id() == listener.id()))
        {
            return Ok(false);
        }

        let record = ListenerRecord {
            serial: self.next_serial,
            listener,
            once,
            claimed: Arc::new(AtomicBool::new(false)),
        };
        self.next_serial = self.next_serial.wrapping_add(1);

        match self.buckets.get_mut(event_type) {
            Some(bucket) => bucket.push(record),
            None => {
                self.buckets.insert(Arc::from(event_type), vec![record]);
            }
        }
        Ok(true)
    }

    /// Remove `listener` from the bucket for `event_type`.
    ///
    /// Removing a listener that is not registered is not an error; the
    /// return value says whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyEventType`] if `event_type` is empty.
    pub fn unregister(&mut self, event_type: &str, listener: ListenerId) -> Result<bool, EventError> {
        require_event_type(event_type, "unregister")?;
        Ok(self.remove_where(event_type, |record| record.listener.id() == listener))
    }

    /// Remove the record with `serial` from the bucket for `event_type`.
    ///
    /// Used by the dispatch engine to retire once-records; a record that is
    /// already gone is left alone.
    pub fn remove_record(&mut self, event_type: &str, serial: u64) -> bool {
        self.remove_where(event_type, |record| record.serial == serial)
    }

    fn remove_where(&mut self, event_type: &str, matches: impl Fn(&ListenerRecord<P>) -> bool) -> bool {
        let Some(bucket) = self.buckets.get_mut(event_type) else {
            return false;
        };
        let Some(position) = bucket.iter().position(matches) else {
            return false;
        };
        bucket.remove(position);
        if bucket.is_empty() {
            self.buckets.shift_remove(event_type);
        }
        true
    }

    /// Drop the bucket for `event_type`, or every bucket when `None`.
    ///
    /// Returns the number of records removed.
    pub fn clear(&mut self, event_type: Option<&str>) -> usize {
        match event_type {
            Some(event_type) => self
                .buckets
                .shift_remove(event_type)
                .map_or(0, |bucket| bucket.len()),
            None => {
                let removed = self.len();
                self.buckets.clear();
                removed
            }
        }
    }

    /// Total number of records across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Whether no listener is registered at all.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of records for `event_type`.
    pub fn count_for(&self, event_type: &str) -> usize {
        self.buckets.get(event_type).map_or(0, Vec::len)
    }

    /// Whether `listener` is registered for `event_type`.
    pub fn contains(&self, event_type: &str, listener: ListenerId) -> bool {
        self.buckets
            .get(event_type)
            .is_some_and(|bucket| bucket.iter().any(|r| r.listener.id() == listener))
    }

    /// Event types holding at least one record, in bucket creation order.
    pub fn event_names(&self) -> EventNames {
        EventNames {
            names: self.buckets.keys().cloned().collect(),
        }
    }

    /// Copy of the records for `event_type`, in delivery order.
    ///
    /// Returns `None` when no listener is registered for it.
    pub fn snapshot(&self, event_type: &str) -> Option<Vec<ListenerRecord<P>>> {
        self.buckets.get(event_type).map(Clone::clone)
    }
}

impl<P> Default for ListenerRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for ListenerRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.buckets.iter().map(|(name, bucket)| (name, bucket.len())))
            .finish()
    }
}
