//! In-memory event store for fast, deterministic testing.

use chrono::{DateTime, Utc};
use identra_core::aggregate::{Aggregate, InstanceId, Sequence};
use identra_core::environment::Clock;
use identra_core::event::{Event, NewEvent};
use identra_core::event_store::{EventFilter, EventStore, EventStoreError};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Log {
    events: Vec<Event>,
    /// Per-instance sequence counters.
    counters: HashMap<InstanceId, u64>,
}

impl Log {
    fn stream_sequence(&self, aggregate: &Aggregate) -> Sequence {
        self.events
            .iter()
            .filter(|event| {
                event.aggregate.instance_id == aggregate.instance_id
                    && event.aggregate.aggregate_type == aggregate.aggregate_type
                    && event.aggregate.id == aggregate.id
            })
            .map(|event| event.sequence)
            .max()
            .unwrap_or(Sequence::INITIAL)
    }
}

/// In-memory [`EventStore`] with the same semantics as the production
/// store: per-instance sequence assignment, compare-and-append optimistic
/// concurrency, and filtered ascending-order queries.
///
/// Appends serialize on an internal lock, so commit order equals sequence
/// order — the property the projection watermark relies on.
///
/// # Example
///
/// ```
/// use identra_core::aggregate::{Aggregate, AggregateId, AggregateType, InstanceId, ResourceOwner, Sequence};
/// use identra_core::event::{EventType, NewEvent};
/// use identra_core::event_store::EventStore;
/// use identra_testing::InMemoryEventStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryEventStore::new();
/// let aggregate = Aggregate::new(
///     InstanceId::new("instance-1"),
///     AggregateType::new("org"),
///     AggregateId::new("org-1"),
///     ResourceOwner::new("org-1"),
/// );
///
/// let stored = store
///     .append(
///         aggregate,
///         Sequence::INITIAL,
///         vec![NewEvent::new(EventType::new("org.added"), serde_json::json!({"name": "ACME"}))],
///     )
///     .await?;
/// assert_eq!(stored[0].sequence, Sequence::new(1));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryEventStore {
    log: Arc<Mutex<Log>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryEventStore {
    /// Create an empty store stamping creation dates with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Log::default())),
            clock: Arc::new(identra_core::environment::SystemClock),
        }
    }

    /// Replace the clock used for creation dates.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Total number of stored events, across all instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    /// Whether the store holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Log> {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        aggregate: Aggregate,
        expected_sequence: Sequence,
        events: Vec<NewEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, EventStoreError>> + Send + '_>> {
        let creation_date = self.now();
        let result = {
            let mut log = self.lock();

            let actual = log.stream_sequence(&aggregate);
            if actual != expected_sequence {
                Err(EventStoreError::Conflict {
                    aggregate,
                    expected: expected_sequence,
                    actual,
                })
            } else {
                let counter = log
                    .counters
                    .entry(aggregate.instance_id.clone())
                    .or_insert(0);

                let mut stored = Vec::with_capacity(events.len());
                for event in events {
                    *counter += 1;
                    stored.push(Event {
                        aggregate: aggregate.clone(),
                        event_type: event.event_type,
                        sequence: Sequence::new(*counter),
                        creation_date,
                        payload: event.payload,
                        editor: event.editor,
                    });
                }
                log.events.extend(stored.iter().cloned());
                Ok(stored)
            }
        };
        Box::pin(async move { result })
    }

    fn query(
        &self,
        filter: EventFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, EventStoreError>> + Send + '_>> {
        let mut events: Vec<Event> = self
            .lock()
            .events
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();
        events.sort_by_key(|event| event.sequence);
        if let Some(limit) = filter.limit {
            events.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Box::pin(async move { Ok(events) })
    }
}
