//! Projection framework: reducers, positions, and statement execution.
//!
//! A projection is a named, independently-progressing reducer that consumes
//! a filtered subset of the event stream (possibly spanning several
//! aggregate types) and produces idempotent [`Statement`]s against the
//! read-model table(s) it owns.
//!
//! # Purity
//!
//! A projection's reduction is a pure function from one event to a small
//! list of statements. It never reads the read model to decide what to
//! write: everything it needs is in the event payload and metadata. This is
//! what makes replays and retries safe — a re-delivered event reduces to
//! the same statements, and the statements are idempotent with respect to
//! their key predicates.
//!
//! # Cascades
//!
//! A read-model row may need edits triggered by events on a *different*
//! aggregate (e.g. deleting all membership rows when a user is removed).
//! The same projection simply subscribes to the other aggregate type; the
//! cascading event carries all identifiers the predicate needs, so no
//! two-aggregate transaction is ever required.
//!
//! # Example
//!
//! ```
//! use identra_core::event::Event;
//! use identra_core::projection::{Interest, Projection, ProjectionError};
//! use identra_core::statement::{Cond, Statement, Statements, Value};
//!
//! struct SessionProjection;
//!
//! impl Projection for SessionProjection {
//!     fn name(&self) -> &'static str {
//!         "sessions"
//!     }
//!
//!     fn interests(&self) -> Vec<Interest> {
//!         vec![Interest::new("user", "user.removed")]
//!     }
//!
//!     fn reduce(&self, event: &Event) -> Result<Statements, ProjectionError> {
//!         let mut statements = Statements::new();
//!         if event.event_type == "user.removed" {
//!             statements.push(Statement::delete(
//!                 "projections.sessions",
//!                 vec![Cond::new("user_id", Value::text(event.aggregate.id.as_str()))],
//!             ));
//!         }
//!         Ok(statements)
//!     }
//! }
//! ```

use crate::aggregate::{AggregateType, Sequence};
use crate::event::{Event, EventError, EventType};
use crate::statement::{Statement, Statements};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

/// Error type for projection operations.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// Read-model storage error; the batch will be retried.
    #[error("storage error: {0}")]
    Storage(String),

    /// A recognized event's payload could not be decoded.
    #[error(transparent)]
    Payload(#[from] EventError),
}

/// One `(aggregate type, event type)` pair a projection subscribes to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Interest {
    /// Aggregate type the event lives on.
    pub aggregate_type: AggregateType,
    /// Event type to reduce.
    pub event_type: EventType,
}

impl Interest {
    /// Create an interest pair.
    #[must_use]
    pub fn new(aggregate_type: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            aggregate_type: AggregateType::new(aggregate_type),
            event_type: EventType::new(event_type),
        }
    }
}

/// A reducer materializing a relational read-model from the event stream.
///
/// Implementations must be `Send + Sync`; the runner holds them as
/// `Arc<dyn Projection>`. Each read-model table is owned by exactly one
/// projection for writes.
pub trait Projection: Send + Sync {
    /// Unique projection name, used as the position bookmark key.
    fn name(&self) -> &'static str;

    /// The `(aggregate type, event type)` pairs this projection reduces.
    ///
    /// The runner derives its event-store filter from these, so an event
    /// type not listed here is never handed to [`reduce`].
    ///
    /// [`reduce`]: Projection::reduce
    fn interests(&self) -> Vec<Interest>;

    /// Reduce one event to statements.
    ///
    /// Must be pure: no I/O, no reads of the read model, deterministic in
    /// the event. Event types outside the declared interests must reduce to
    /// an empty statement list rather than an error, so interest lists can
    /// grow without breaking replay of old positions.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Payload`] when a recognized event carries
    /// an undecodable payload.
    fn reduce(&self, event: &Event) -> Result<Statements, ProjectionError>;
}

/// A projection's bookmark into the event stream.
///
/// Records the highest sequence already applied to the read model, mutated
/// only by the runner after a successfully committed statement batch.
/// Re-delivery of events at or below the position is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Highest applied sequence (a watermark across the filtered stream).
    pub sequence: Sequence,
    /// When this position was reached.
    pub timestamp: DateTime<Utc>,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub const fn new(sequence: Sequence, timestamp: DateTime<Utc>) -> Self {
        Self {
            sequence,
            timestamp,
        }
    }

    /// A position at the beginning of the stream.
    #[must_use]
    pub fn beginning() -> Self {
        Self {
            sequence: Sequence::INITIAL,
            timestamp: Utc::now(),
        }
    }
}

/// Transactional executor for statement batches.
///
/// Applies a batch of statements derived from a contiguous run of events
/// *and* the position advance inside one transaction, all-or-nothing. If
/// execution fails the transaction rolls back, the position stays put, and
/// the runner retries the batch from the same starting point.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so runners can hold
/// `Arc<dyn StatementExecutor>`.
pub trait StatementExecutor: Send + Sync {
    /// Apply a statement batch and advance the projection's position, in
    /// one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on any storage failure; the
    /// caller must treat the whole batch as not applied.
    fn execute(
        &self,
        projection_name: &str,
        statements: &[Statement],
        position: Position,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>>;

    /// Load the projection's committed position.
    ///
    /// Returns `None` for a projection that has never applied a batch
    /// (start from the beginning).
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on storage failure.
    fn position(
        &self,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Position>, ProjectionError>> + Send + '_>>;
}

/// Wake signal pulsed by command handlers after a relevant append.
///
/// Runners poll on a recurring schedule regardless; the wake signal just
/// shortens the latency between an append and the next projection run.
/// Cloning shares the underlying signal.
#[derive(Clone, Debug, Default)]
pub struct WakeSignal {
    notify: Arc<Notify>,
}

impl WakeSignal {
    /// Create a new wake signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake all currently-waiting runners and mark a pending wake for the
    /// next waiter.
    pub fn wake(&self) {
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Wait until the next wake.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)] // Test assertions use expect for clear failure messages

    use super::*;
    use std::time::Duration;

    #[test]
    fn beginning_position_is_initial() {
        let position = Position::beginning();
        assert!(position.sequence.is_initial());
    }

    #[test]
    fn interest_pairs() {
        let interest = Interest::new("org", "org.member.added");
        assert_eq!(interest.aggregate_type.as_str(), "org");
        assert_eq!(interest.event_type.as_str(), "org.member.added");
    }

    #[tokio::test]
    async fn wake_signal_releases_waiter() {
        let signal = WakeSignal::new();
        let waiter = signal.clone();

        let handle = tokio::spawn(async move {
            waiter.wait().await;
        });

        // Give the waiter a chance to park before waking it.
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.wake();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should be woken")
            .expect("waiter task should not panic");
    }

    #[tokio::test]
    async fn wake_before_wait_is_not_lost() {
        let signal = WakeSignal::new();
        signal.wake();

        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("a pending wake should release the next waiter");
    }
}
