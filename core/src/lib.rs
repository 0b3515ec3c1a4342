//! # Identra Core
//!
//! Core traits and types for the Identra event-sourcing engine — the
//! transactional heart of an identity-and-access-management platform.
//!
//! Every change to an organization, user, identity-provider configuration,
//! or membership is recorded as an immutable domain event, and all
//! read-side state is derived by replaying those events. This crate defines
//! the mechanics by which events become state and state becomes
//! read-models:
//!
//! - [`event`]: immutable domain events with JSON payloads keyed by event type
//! - [`aggregate`]: aggregate identity and per-stream sequences
//! - [`event_store`]: the append-only log with optimistic concurrency
//! - [`write_model`]: pure-fold reconstruction of aggregate state for
//!   command validation
//! - [`projection`] and [`statement`]: reducers materializing relational
//!   read-models through idempotent write statements
//! - [`error`]: the command failure taxonomy
//! - [`environment`]: injected clock and id-generation dependencies
//!
//! ## Consistency model
//!
//! Within one aggregate stream, events are strictly ordered and appends are
//! guarded by compare-and-append on the expected sequence — writers race,
//! exactly one of a racing pair wins, the loser observes a conflict and
//! retries. Across streams nothing is ordered; projections are
//! asynchronous and eventually consistent, and their statements are
//! idempotent so at-least-once delivery has effectively-once effect.
//!
//! ## Example
//!
//! ```no_run
//! use identra_core::aggregate::{Aggregate, AggregateId, AggregateType, InstanceId, ResourceOwner, Sequence};
//! use identra_core::event::{EventType, NewEvent};
//! use identra_core::event_store::EventStore;
//!
//! async fn example(store: &dyn EventStore) -> Result<(), Box<dyn std::error::Error>> {
//!     let aggregate = Aggregate::new(
//!         InstanceId::new("instance-1"),
//!         AggregateType::new("org"),
//!         AggregateId::new("org-1"),
//!         ResourceOwner::new("org-1"),
//!     );
//!
//!     let stored = store
//!         .append(
//!             aggregate,
//!             Sequence::INITIAL,
//!             vec![NewEvent::new(
//!                 EventType::new("org.added"),
//!                 serde_json::json!({"name": "ACME"}),
//!             )],
//!         )
//!         .await?;
//!     assert_eq!(stored[0].sequence, Sequence::new(1));
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod environment;
pub mod error;
pub mod event;
pub mod event_store;
pub mod projection;
pub mod statement;
pub mod write_model;

pub use aggregate::{Aggregate, AggregateId, AggregateType, InstanceId, ResourceOwner, Sequence};
pub use error::CommandError;
pub use event::{Editor, Event, EventType, NewEvent};
pub use event_store::{EventFilter, EventStore, EventStoreError};
pub use projection::{
    Interest, Position, Projection, ProjectionError, StatementExecutor, WakeSignal,
};
pub use statement::{Column, Cond, Statement, Statements, Value};
pub use write_model::{WriteModel, WriteModelBase, WriteModelError};
