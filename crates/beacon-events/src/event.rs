//! The event record delivered to listeners.
//!
//! Every [`Event`] carries a string discriminator (its type), a creation
//! timestamp, and either a caller payload or, on the error channel, the
//! [`Failure`] being reported.
//!
//! # Payload typing
//!
//! `Event<P>` is generic over its payload. A payload enum can name its own
//! tag by implementing [`EventKind`], so [`Event::typed`] can never pair a
//! payload with the wrong tag. Untyped callers use [`JsonPayload`] and the
//! JSON helpers, which read and write the wire shape
//! `{ "type": ..., "timeStamp": ..., ...payload }`.

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::{EventError, require_event_type};
use crate::failure::Failure;

/// The reserved tag of the error channel.
pub const ERROR_EVENT: &str = "error";

/// A dynamic payload: the fields of a JSON event besides `type` and
/// `timeStamp`.
pub type JsonPayload = Map<String, Value>;

/// A payload type that knows which event type it belongs to.
pub trait EventKind {
    /// The tag listeners register against for this payload.
    fn event_type(&self) -> &str;
}

#[derive(Debug, Clone)]
enum Detail<P> {
    Payload(P),
    Error(Failure),
}

/// A tagged event.
#[derive(Debug, Clone)]
pub struct Event<P = JsonPayload> {
    event_type: String,
    time_stamp: i64,
    detail: Detail<P>,
}

impl<P> Event<P> {
    /// Create an event of the given type, stamped with the current time.
    pub fn new(event_type: impl Into<String>, payload: P) -> Self {
        Self {
            event_type: event_type.into(),
            time_stamp: now_millis(),
            detail: Detail::Payload(payload),
        }
    }

    /// Create an event whose type is taken from the payload itself.
    pub fn typed(payload: P) -> Self
    where
        P: EventKind,
    {
        let event_type = payload.event_type().to_owned();
        Self::new(event_type, payload)
    }

    /// Create an error-channel event carrying `failure`.
    pub fn from_failure(failure: Failure) -> Self {
        Self {
            event_type: ERROR_EVENT.to_owned(),
            time_stamp: now_millis(),
            detail: Detail::Error(failure),
        }
    }

    /// Replace the creation timestamp (milliseconds since the UNIX epoch).
    #[must_use]
    pub fn with_time_stamp(mut self, time_stamp: i64) -> Self {
        self.time_stamp = time_stamp;
        self
    }

    /// The event type listeners are matched against.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Milliseconds since the UNIX epoch at which the event was created.
    pub const fn time_stamp(&self) -> i64 {
        self.time_stamp
    }

    /// The caller payload. `None` for synthesized error-channel events.
    pub const fn payload(&self) -> Option<&P> {
        match &self.detail {
            Detail::Payload(payload) => Some(payload),
            Detail::Error(_) => None,
        }
    }

    /// Take the caller payload out of the event.
    pub fn into_payload(self) -> Option<P> {
        match self.detail {
            Detail::Payload(payload) => Some(payload),
            Detail::Error(_) => None,
        }
    }

    /// The reported failure. Set only on events synthesized by
    /// [`dispatch_error`](crate::EventTarget::dispatch_error) or
    /// [`Event::from_failure`].
    pub const fn error(&self) -> Option<&Failure> {
        match &self.detail {
            Detail::Payload(_) => None,
            Detail::Error(failure) => Some(failure),
        }
    }

    /// Whether this event is on the error channel.
    pub fn is_error(&self) -> bool {
        self.event_type == ERROR_EVENT
    }
}

impl<P: Serialize> Event<P> {
    /// Render the event in its wire shape.
    ///
    /// Object payloads are flattened next to `type` and `timeStamp` (they
    /// cannot shadow either); other payloads land under `payload`. Error
    /// events carry the failure message under `error`.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the payload cannot be represented
    /// as JSON.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        let mut object = Map::new();
        object.insert(String::from("type"), Value::String(self.event_type.clone()));
        object.insert(String::from("timeStamp"), Value::from(self.time_stamp));
        match &self.detail {
            Detail::Payload(payload) => match serde_json::to_value(payload)? {
                Value::Object(fields) => {
                    for (key, value) in fields {
                        object.entry(key).or_insert(value);
                    }
                }
                Value::Null => {}
                other => {
                    object.insert(String::from("payload"), other);
                }
            },
            Detail::Error(failure) => {
                object.insert(String::from("error"), Value::String(failure.message()));
            }
        }
        Ok(Value::Object(object))
    }
}

impl Event<JsonPayload> {
    /// Read an event from its wire shape.
    ///
    /// `type` must be a non-empty string. `timeStamp` is optional; when
    /// absent the event is stamped with the current time. Every other field
    /// becomes the payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::MalformedEvent`] if `value` is not an object
    /// with a string `type` or its `timeStamp` is not a number, and
    /// [`EventError::EmptyEventType`] if `type` is empty.
    pub fn from_json(value: Value) -> Result<Self, EventError> {
        let Value::Object(mut fields) = value else {
            return Err(malformed("expected a JSON object"));
        };

        let event_type = match fields.remove("type") {
            Some(Value::String(event_type)) => event_type,
            Some(_) => return Err(malformed("`type` must be a string")),
            None => return Err(malformed("missing `type`")),
        };
        require_event_type(&event_type, "from_json")?;

        let time_stamp = match fields.remove("timeStamp") {
            None | Some(Value::Null) => now_millis(),
            Some(Value::Number(number)) => number_to_millis(&number)?,
            Some(_) => return Err(malformed("`timeStamp` must be a number")),
        };

        Ok(Self {
            event_type,
            time_stamp,
            detail: Detail::Payload(fields),
        })
    }

    /// Parse an event from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::MalformedEvent`] if the text is not valid JSON,
    /// plus everything [`Event::from_json`] rejects.
    pub fn parse(text: &str) -> Result<Self, EventError> {
        let value: Value = serde_json::from_str(text).map_err(|e| EventError::MalformedEvent {
            reason: format!("invalid JSON: {e}"),
        })?;
        Self::from_json(value)
    }

    /// Look up one payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload().and_then(|fields| fields.get(name))
    }
}

fn malformed(reason: &str) -> EventError {
    EventError::MalformedEvent {
        reason: reason.to_owned(),
    }
}

// Saturating truncation; sub-millisecond precision is dropped.
#[allow(clippy::cast_possible_truncation)]
fn number_to_millis(number: &Number) -> Result<i64, EventError> {
    if let Some(millis) = number.as_i64() {
        return Ok(millis);
    }
    match number.as_f64() {
        Some(millis) if millis.is_finite() => Ok(millis.trunc() as i64),
        _ => Err(malformed("`timeStamp` is out of range")),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
