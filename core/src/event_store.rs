//! Event store trait and query filters.
//!
//! The event store is the single source of truth: an append-only,
//! per-aggregate-ordered log of domain events. This module defines the
//! storage abstraction plus the filter type used for range queries.
//!
//! # Design
//!
//! The trait is deliberately minimal:
//!
//! - Append events to an aggregate stream with optimistic concurrency
//! - Query events by filter, in ascending sequence order
//!
//! Retrieval is polling-based: a query returns a finite, replayable batch,
//! and callers needing newer events re-query with an advanced sequence lower
//! bound. There is no subscription mechanism — this tolerates consumer
//! restarts and multiple consumer instances without a notification channel.
//!
//! # Implementations
//!
//! - `PostgresEventStore` (in `identra-postgres`): production implementation
//! - `InMemoryEventStore` (in `identra-testing`): fast, deterministic testing
//!
//! # Dyn Compatibility
//!
//! The trait uses explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` to enable trait object usage (`Arc<dyn EventStore>`), which is
//! how command handlers and projection runners hold the store.

use crate::aggregate::{Aggregate, AggregateId, AggregateType, InstanceId, Sequence};
use crate::event::{Event, EventType, NewEvent};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: the stream's current sequence does
    /// not match the expected sequence.
    ///
    /// Another writer appended to the same aggregate between the caller's
    /// write-model load and this append. Nothing was appended; the caller
    /// must re-read the write model and retry the whole command.
    #[error("concurrency conflict on {aggregate}: expected sequence {expected}, found {actual}")]
    Conflict {
        /// The aggregate stream where the conflict occurred.
        aggregate: Aggregate,
        /// The sequence the caller expected the stream to be at.
        expected: Sequence,
        /// The actual current sequence of the stream.
        actual: Sequence,
    },

    /// Storage I/O failure (connection, query, transaction).
    #[error("event store unavailable: {0}")]
    Unavailable(String),

    /// Event (de)serialization failure at the storage boundary.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Filter for event queries.
///
/// All clauses are conjunctive; list clauses (`aggregate_types`,
/// `aggregate_ids`, `event_types`) match if the event matches *any* entry.
/// An empty list clause matches everything. Results are always ordered by
/// ascending sequence.
///
/// # Examples
///
/// ```
/// use identra_core::aggregate::{InstanceId, Sequence};
/// use identra_core::event_store::EventFilter;
///
/// let filter = EventFilter::new(InstanceId::new("instance-1"))
///     .aggregate_types(["org"])
///     .event_types(["org.member.added", "org.member.changed"])
///     .after_sequence(Sequence::new(10))
///     .limit(200);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventFilter {
    /// Instance the query is scoped to.
    pub instance_id: InstanceId,
    /// Aggregate types to match (empty = all).
    pub aggregate_types: Vec<AggregateType>,
    /// Aggregate ids to match (empty = all).
    pub aggregate_ids: Vec<AggregateId>,
    /// Event types to match (empty = all).
    pub event_types: Vec<EventType>,
    /// Exclusive sequence lower bound: only events with a greater sequence.
    pub after_sequence: Option<Sequence>,
    /// Only events created at or after this date.
    pub created_after: Option<DateTime<Utc>>,
    /// Maximum number of events to return.
    pub limit: Option<u64>,
}

impl EventFilter {
    /// Create a filter scoped to one instance.
    #[must_use]
    pub fn new(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            ..Self::default()
        }
    }

    /// Restrict to the given aggregate types.
    #[must_use]
    pub fn aggregate_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.aggregate_types = types.into_iter().map(AggregateType::new).collect();
        self
    }

    /// Restrict to the given aggregate ids.
    #[must_use]
    pub fn aggregate_ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.aggregate_ids = ids.into_iter().map(AggregateId::new).collect();
        self
    }

    /// Restrict to the given event types.
    #[must_use]
    pub fn event_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.event_types = types.into_iter().map(EventType::new).collect();
        self
    }

    /// Only return events with a sequence strictly greater than `sequence`.
    ///
    /// Within a single aggregate stream this is a resume point; across
    /// streams it acts as a global watermark for pollers.
    #[must_use]
    pub const fn after_sequence(mut self, sequence: Sequence) -> Self {
        self.after_sequence = Some(sequence);
        self
    }

    /// Only return events created at or after `date`.
    #[must_use]
    pub const fn created_after(mut self, date: DateTime<Utc>) -> Self {
        self.created_after = Some(date);
        self
    }

    /// Limit the number of returned events.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check whether an event matches this filter (ignoring `limit`).
    ///
    /// The in-memory store and the projection runner's interest routing both
    /// evaluate filters on the application side with this predicate; SQL
    /// implementations translate the same clauses into `WHERE` conditions.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if event.aggregate.instance_id != self.instance_id {
            return false;
        }
        if !self.aggregate_types.is_empty()
            && !self.aggregate_types.contains(&event.aggregate.aggregate_type)
        {
            return false;
        }
        if !self.aggregate_ids.is_empty() && !self.aggregate_ids.contains(&event.aggregate.id) {
            return false;
        }
        if !self.event_types.is_empty() && !self.event_types.contains(&event.event_type) {
            return false;
        }
        if let Some(after) = self.after_sequence {
            if event.sequence <= after {
                return false;
            }
        }
        if let Some(created_after) = self.created_after {
            if event.creation_date < created_after {
                return false;
            }
        }
        true
    }
}

/// Event store abstraction: append-only, per-aggregate-ordered persistence.
///
/// # Concurrency
///
/// `append` is the only point requiring cross-writer coordination, resolved
/// with optimistic concurrency (compare-and-append on the expected
/// sequence) rather than locking. Writers never block each other: of two
/// racing appends to the same aggregate exactly one wins; the loser
/// observes [`EventStoreError::Conflict`].
///
/// Reads are lock-free: events are immutable, so queries need no
/// coordination with writers.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; they are shared across command
/// handlers and projection runners as `Arc<dyn EventStore>`.
pub trait EventStore: Send + Sync {
    /// Append events to an aggregate stream with optimistic concurrency.
    ///
    /// Appends all of `events` atomically, but only if the stream's current
    /// maximum sequence equals `expected_sequence`
    /// ([`Sequence::INITIAL`](crate::aggregate::Sequence::INITIAL) for a
    /// stream that must not exist yet). On success the events receive fresh
    /// strictly increasing sequences from the instance's counter and the
    /// stored events are returned. On mismatch nothing is appended.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::Conflict`]: another writer advanced the stream
    /// - [`EventStoreError::Unavailable`]: storage failure
    /// - [`EventStoreError::Serialization`]: payload could not be stored
    fn append(
        &self,
        aggregate: Aggregate,
        expected_sequence: Sequence,
        events: Vec<NewEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, EventStoreError>> + Send + '_>>;

    /// Query events matching a filter, in ascending sequence order.
    ///
    /// The result is a finite, replayable batch — not a live subscription.
    /// A stream that matches nothing yields an empty vector (not an error;
    /// new aggregates start empty).
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::Unavailable`]: storage failure
    /// - [`EventStoreError::Serialization`]: stored payload could not be read
    fn query(
        &self,
        filter: EventFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, EventStoreError>> + Send + '_>>;
}
