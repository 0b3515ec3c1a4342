//! Write-model reduction framework.
//!
//! A write model is the in-memory reduction of one aggregate's event history
//! into typed fields, built immediately before a command validates and
//! discarded when the command completes. It is never persisted, and it is
//! exclusively owned by the command-handler invocation that built it.
//!
//! # Reduction semantics
//!
//! Reduction is a pure fold: `fold(zero_value, events) -> state`, applied in
//! ascending sequence order. Reductions must be deterministic functions of
//! the event sequence — no I/O, no randomness — so re-folding the same
//! prefix of events always yields the same state. Unrecognized event types
//! are ignored, not errors, so old write models keep working as new event
//! types appear. An empty stream folds to the zero value, which is how
//! commands detect "does not exist".
//!
//! # Example
//!
//! ```
//! use identra_core::aggregate::{AggregateId, InstanceId};
//! use identra_core::event::{Event, EventError};
//! use identra_core::event_store::EventFilter;
//! use identra_core::write_model::{WriteModel, WriteModelBase};
//!
//! #[derive(Default)]
//! struct OrgNameWriteModel {
//!     base: WriteModelBase,
//!     name: String,
//! }
//!
//! impl WriteModel for OrgNameWriteModel {
//!     fn base(&self) -> &WriteModelBase {
//!         &self.base
//!     }
//!
//!     fn base_mut(&mut self) -> &mut WriteModelBase {
//!         &mut self.base
//!     }
//!
//!     fn query(&self) -> EventFilter {
//!         EventFilter::new(self.base.instance_id.clone())
//!             .aggregate_types(["org"])
//!             .aggregate_ids([self.base.aggregate_id.as_str()])
//!     }
//!
//!     fn reduce(&mut self, event: &Event) -> Result<(), EventError> {
//!         if event.event_type == "org.added" {
//!             #[derive(serde::Deserialize)]
//!             struct Payload { name: String }
//!             self.name = event.payload::<Payload>()?.name;
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use crate::aggregate::{AggregateId, InstanceId, ResourceOwner, Sequence};
use crate::event::{Event, EventError};
use crate::event_store::{EventFilter, EventStore, EventStoreError};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from loading a write model.
#[derive(Error, Debug)]
pub enum WriteModelError {
    /// The underlying event query failed.
    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// A stored payload could not be decoded by the reduction.
    #[error(transparent)]
    Event(#[from] EventError),
}

/// State common to every write model, maintained by the loader.
///
/// Concrete write models embed this struct and expose it through
/// [`WriteModel::base`]. After [`load`] the base records the stream's
/// last-observed sequence (`processed_sequence`), which command handlers use
/// as the expected sequence for their optimistic-concurrency append.
#[derive(Clone, Debug, Default)]
pub struct WriteModelBase {
    /// The aggregate this write model reduces.
    pub aggregate_id: AggregateId,
    /// The instance the aggregate is scoped to.
    pub instance_id: InstanceId,
    /// Owning organization, taken from the reduced events.
    pub resource_owner: ResourceOwner,
    /// Highest sequence folded into this model; `Sequence::INITIAL` for an
    /// empty stream.
    pub processed_sequence: Sequence,
    /// Creation date of the last folded event.
    pub change_date: Option<DateTime<Utc>>,
}

impl WriteModelBase {
    /// Create the zero-valued base for one aggregate.
    #[must_use]
    pub fn new(instance_id: InstanceId, aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_id,
            instance_id,
            ..Self::default()
        }
    }
}

/// A reduction of one aggregate stream into typed fields.
///
/// Implementations declare which events they need via [`query`] and fold
/// them via [`reduce`]. The base-state bookkeeping (processed sequence,
/// change date, resource owner) is handled by [`load`]; `reduce` only deals
/// with domain fields.
///
/// [`query`]: WriteModel::query
/// [`reduce`]: WriteModel::reduce
pub trait WriteModel {
    /// The embedded base state.
    fn base(&self) -> &WriteModelBase;

    /// Mutable access to the embedded base state.
    fn base_mut(&mut self) -> &mut WriteModelBase;

    /// The event filter selecting this model's stream, optionally narrowed
    /// to the event types the reduction cares about.
    fn query(&self) -> EventFilter;

    /// Fold one event into the model.
    ///
    /// Must be pure and total over the declared event-type set; unrecognized
    /// event types must be ignored.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] only when a recognized event's payload cannot
    /// be decoded.
    fn reduce(&mut self, event: &Event) -> Result<(), EventError>;
}

/// Load a write model: query its stream and fold all events in order.
///
/// After this returns, `wm.base().processed_sequence` is the stream's
/// last-observed sequence and is the value to pass as the expected sequence
/// when appending. A write model whose `processed_sequence` is still
/// [`Sequence::INITIAL`] observed an empty stream.
///
/// # Errors
///
/// Returns [`WriteModelError`] if the query fails or a payload cannot be
/// decoded.
pub async fn load<W: WriteModel + ?Sized>(
    store: &dyn EventStore,
    wm: &mut W,
) -> Result<(), WriteModelError> {
    let events = store.query(wm.query()).await?;
    for event in &events {
        wm.reduce(event)?;

        let base = wm.base_mut();
        base.processed_sequence = event.sequence;
        base.change_date = Some(event.creation_date);
        if base.resource_owner.as_str().is_empty() {
            base.resource_owner = event.aggregate.resource_owner.clone();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)] // Test assertions use expect for clear failure messages

    use super::*;
    use crate::aggregate::{Aggregate, AggregateType};
    use crate::event::{Editor, EventType};
    use serde::Deserialize;
    use std::future::Future;
    use std::pin::Pin;

    #[derive(Default)]
    struct CounterWriteModel {
        base: WriteModelBase,
        count: u64,
    }

    impl WriteModel for CounterWriteModel {
        fn base(&self) -> &WriteModelBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut WriteModelBase {
            &mut self.base
        }

        fn query(&self) -> EventFilter {
            EventFilter::new(self.base.instance_id.clone())
                .aggregate_ids([self.base.aggregate_id.as_str()])
        }

        fn reduce(&mut self, event: &Event) -> Result<(), EventError> {
            #[derive(Deserialize)]
            struct Payload {
                by: u64,
            }

            if event.event_type == "counter.incremented" {
                self.count += event.payload::<Payload>()?.by;
            }
            Ok(())
        }
    }

    struct FixedStore(Vec<Event>);

    impl EventStore for FixedStore {
        fn append(
            &self,
            _aggregate: Aggregate,
            _expected_sequence: Sequence,
            _events: Vec<crate::event::NewEvent>,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, EventStoreError>> + Send + '_>>
        {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn query(
            &self,
            filter: EventFilter,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, EventStoreError>> + Send + '_>>
        {
            let events: Vec<Event> = self.0.iter().filter(|e| filter.matches(e)).cloned().collect();
            Box::pin(async move { Ok(events) })
        }
    }

    fn event(sequence: u64, event_type: &str, payload: serde_json::Value) -> Event {
        Event {
            aggregate: Aggregate::new(
                InstanceId::new("instance-1"),
                AggregateType::new("counter"),
                AggregateId::new("counter-1"),
                ResourceOwner::new("org-1"),
            ),
            event_type: EventType::new(event_type),
            sequence: Sequence::new(sequence),
            creation_date: Utc::now(),
            payload,
            editor: Editor::default(),
        }
    }

    fn model() -> CounterWriteModel {
        CounterWriteModel {
            base: WriteModelBase::new(
                InstanceId::new("instance-1"),
                AggregateId::new("counter-1"),
            ),
            count: 0,
        }
    }

    #[tokio::test]
    async fn empty_stream_folds_to_zero_value() {
        let store = FixedStore(Vec::new());
        let mut wm = model();

        load(&store, &mut wm).await.expect("load should succeed");

        assert_eq!(wm.count, 0);
        assert!(wm.base.processed_sequence.is_initial());
        assert!(wm.base.change_date.is_none());
    }

    #[tokio::test]
    async fn folds_events_and_tracks_base_state() {
        let store = FixedStore(vec![
            event(1, "counter.incremented", serde_json::json!({"by": 2})),
            event(2, "counter.incremented", serde_json::json!({"by": 3})),
        ]);
        let mut wm = model();

        load(&store, &mut wm).await.expect("load should succeed");

        assert_eq!(wm.count, 5);
        assert_eq!(wm.base.processed_sequence, Sequence::new(2));
        assert_eq!(wm.base.resource_owner.as_str(), "org-1");
        assert!(wm.base.change_date.is_some());
    }

    #[tokio::test]
    async fn unrecognized_event_types_are_ignored() {
        let store = FixedStore(vec![
            event(1, "counter.incremented", serde_json::json!({"by": 2})),
            event(2, "counter.repainted", serde_json::json!({"color": "red"})),
        ]);
        let mut wm = model();

        load(&store, &mut wm).await.expect("load should succeed");

        assert_eq!(wm.count, 2);
        // The unknown event still advances the processed sequence.
        assert_eq!(wm.base.processed_sequence, Sequence::new(2));
    }

    #[tokio::test]
    async fn refolding_is_deterministic() {
        let events = vec![
            event(1, "counter.incremented", serde_json::json!({"by": 1})),
            event(2, "counter.incremented", serde_json::json!({"by": 4})),
        ];
        let store = FixedStore(events);

        let mut first = model();
        load(&store, &mut first).await.expect("load should succeed");
        let mut second = model();
        load(&store, &mut second).await.expect("load should succeed");

        assert_eq!(first.count, second.count);
        assert_eq!(first.base.processed_sequence, second.base.processed_sequence);
    }
}
