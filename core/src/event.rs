//! Domain event types.
//!
//! Events are immutable facts: every state change in the system is recorded
//! as an event appended to the event log, and all read-side state is derived
//! by replaying events. An event carries its aggregate identity, a per-stream
//! [`Sequence`](crate::aggregate::Sequence), a creation date, and a JSON
//! payload whose schema is keyed by the event type.
//!
//! # Design
//!
//! Payloads are stored as JSON rather than a binary format because command
//! handlers emit *changed-field* payloads (unchanged attributes are omitted)
//! and because write models and projections of different crates decode
//! overlapping subsets of the same payload. JSON keeps both forward
//! compatible: unknown fields are ignored, absent fields deserialize to
//! `Option::None`.
//!
//! # Example
//!
//! ```
//! use identra_core::event::{EventType, NewEvent};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! #[serde(rename_all = "camelCase")]
//! struct MemberAdded<'a> {
//!     user_id: &'a str,
//!     roles: Vec<&'a str>,
//! }
//!
//! let event = NewEvent::from_payload(
//!     EventType::new("org.member.added"),
//!     &MemberAdded { user_id: "user-1", roles: vec!["ORG_OWNER"] },
//! ).unwrap();
//! assert_eq!(event.event_type.as_str(), "org.member.added");
//! ```

use crate::aggregate::{Aggregate, Sequence};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event payload handling.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize a payload to JSON.
    #[error("failed to serialize payload for {event_type}: {source}")]
    Serialize {
        /// The event type whose payload failed to serialize.
        event_type: EventType,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Failed to deserialize a payload from JSON.
    #[error("failed to deserialize payload of {event_type}: {source}")]
    Deserialize {
        /// The event type whose payload failed to deserialize.
        event_type: EventType,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

/// Discriminant identifying the schema of an event's payload.
///
/// Event types are dotted, stable string identifiers scoped by aggregate,
/// e.g. `"org.member.added"` or `"org.idp.config.removed"`. Reducers switch
/// on the event type; unknown types are ignored rather than rejected so new
/// event types can be introduced without breaking old reducers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventType(String);

impl EventType {
    /// Create a new `EventType`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the event type as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<&str> for EventType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Identity of the service and user that caused an event.
///
/// Recorded for audit purposes only; business decisions never depend on it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Editor {
    /// Name of the service that appended the event.
    pub service: String,
    /// Identifier of the user on whose behalf the event was appended.
    pub user: String,
}

impl Editor {
    /// Create a new editor record.
    #[must_use]
    pub fn new(service: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            user: user.into(),
        }
    }
}

/// An event as stored in the event log.
///
/// Stored events are immutable: they are never mutated or deleted except by
/// explicit, event-logged retention operations. The `sequence` is assigned
/// by the event store at append time from a per-instance counter and is
/// strictly increasing within the aggregate stream; a reader of a
/// consistent snapshot never observes a later event slot in front of an
/// earlier one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identity of the stream this event belongs to.
    pub aggregate: Aggregate,
    /// Discriminant keying the payload schema.
    pub event_type: EventType,
    /// Position within the aggregate stream, assigned at append time.
    pub sequence: Sequence,
    /// When the event was appended.
    pub creation_date: DateTime<Utc>,
    /// JSON payload; schema keyed by `event_type`. Changed-field payloads
    /// omit unchanged attributes.
    pub payload: serde_json::Value,
    /// Who caused the event (audit metadata).
    pub editor: Editor,
}

impl Event {
    /// Decode the payload into a typed struct.
    ///
    /// Unknown payload fields are ignored; absent optional fields
    /// deserialize to `None`, which is how changed-field payloads are read.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Deserialize`] if the payload does not match the
    /// requested type.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, EventError> {
        serde_json::from_value(self.payload.clone()).map_err(|source| EventError::Deserialize {
            event_type: self.event_type.clone(),
            source,
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} on {}",
            self.event_type, self.sequence, self.aggregate
        )
    }
}

/// An event produced by a command handler, not yet appended.
///
/// The event store assigns `sequence` and `creation_date` at append time;
/// until then an event is just a type, a payload, and its editor metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Discriminant keying the payload schema.
    pub event_type: EventType,
    /// JSON payload.
    pub payload: serde_json::Value,
    /// Who caused the event.
    pub editor: Editor,
}

impl NewEvent {
    /// Create a new event from an already-encoded JSON payload.
    #[must_use]
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            payload,
            editor: Editor::default(),
        }
    }

    /// Create a new event by serializing a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialize`] if the payload cannot be encoded,
    /// which only happens for payload types containing non-JSON-representable
    /// values.
    pub fn from_payload<T: Serialize>(
        event_type: EventType,
        payload: &T,
    ) -> Result<Self, EventError> {
        let payload = serde_json::to_value(payload).map_err(|source| EventError::Serialize {
            event_type: event_type.clone(),
            source,
        })?;
        Ok(Self::new(event_type, payload))
    }

    /// Attach editor metadata.
    #[must_use]
    pub fn with_editor(mut self, editor: Editor) -> Self {
        self.editor = editor;
        self
    }
}
