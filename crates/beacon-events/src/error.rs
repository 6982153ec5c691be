//! Error types for the `beacon-events` crate.
//!
//! [`EventError`] covers malformed calls into the event target. These are
//! returned synchronously to the caller that made the call; they are never
//! routed through the error channel.

/// Errors returned by misuse of the registry or dispatch operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// An operation was given an empty event type.
    #[error("{operation}: event type must be a non-empty string")]
    EmptyEventType {
        /// The operation that rejected the call.
        operation: &'static str,
    },

    /// A JSON value could not be read as an event.
    #[error("malformed event: {reason}")]
    MalformedEvent {
        /// What was wrong with the value.
        reason: String,
    },
}

impl EventError {
    /// Returns a short stable label (`snake_case`) for use in logs.
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::EmptyEventType { .. } => "empty_event_type",
            Self::MalformedEvent { .. } => "malformed_event",
        }
    }
}

/// Reject an empty event type on behalf of `operation`.
pub(crate) fn require_event_type(event_type: &str, operation: &'static str) -> Result<(), EventError> {
    if event_type.is_empty() {
        return Err(EventError::EmptyEventType { operation });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_type_is_rejected() {
        let err = require_event_type("", "dispatch");
        assert_eq!(err, Err(EventError::EmptyEventType { operation: "dispatch" }));
        assert_eq!(
            err.err().map(|e| e.to_string()),
            Some(String::from("dispatch: event type must be a non-empty string"))
        );
    }

    #[test]
    fn labels_are_stable() {
        let err = EventError::MalformedEvent {
            reason: String::from("not an object"),
        };
        assert_eq!(err.as_label(), "malformed_event");
        assert!(require_event_type("x", "register").is_ok());
    }
}
