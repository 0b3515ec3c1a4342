//! Projection runner: schedules a projection, batches events, applies
//! statements, and tracks the position.
//!
//! # State machine
//!
//! Per projection, per instance the runner cycles
//! `Idle → Fetching → Reducing → Applying → Idle`. A failure during
//! `Applying` loops back to `Idle` *without* advancing the position, and
//! the same batch is retried (with backoff) from the same starting point —
//! safe because statements are idempotent with respect to their key
//! predicates.
//!
//! # Trigger model
//!
//! The runner is a poller: it pulls from the committed position forward,
//! bounded by the configured batch size, on a recurring schedule and
//! whenever the wake signal is pulsed after a command append. A slow or
//! crashed runner never blocks writers, and a restarted runner resumes
//! exactly where its position left off.
//!
//! Multiple runner instances for the same projection do not need a lock to
//! stay correct: statement idempotency makes a doubly-applied batch
//! harmless. A per-projection lock would merely avoid the wasted work.
//!
//! # Example
//!
//! ```ignore
//! let wake = WakeSignal::new();
//! let (runner, shutdown) = ProjectionRunner::new(
//!     Arc::new(OrgMemberProjection),
//!     store,
//!     executor,
//!     InstanceId::new("instance-1"),
//!     RunnerConfig::default(),
//!     wake.clone(),
//! );
//! tokio::spawn(runner.run());
//!
//! // In a signal handler:
//! shutdown.send(true).ok();
//! ```

use crate::retry::RetryPolicy;
use chrono::Utc;
use identra_core::aggregate::{InstanceId, Sequence};
use identra_core::event_store::{EventFilter, EventStore};
use identra_core::projection::{
    Position, Projection, ProjectionError, StatementExecutor, WakeSignal,
};
use identra_core::statement::Statement;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Processing phase of one runner cycle, recorded in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Fetching,
    Reducing,
    Applying,
}

/// Tuning knobs of a [`ProjectionRunner`].
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// How often to poll when no wake signal arrives.
    pub requeue_every: Duration,
    /// Maximum number of events fetched per batch.
    pub bulk_limit: u64,
    /// Backoff between retries of a failed batch.
    pub retry: RetryPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            requeue_every: Duration::from_secs(10),
            bulk_limit: 200,
            retry: RetryPolicy::default(),
        }
    }
}

/// Drives one projection for one instance.
///
/// Shares the event store and executor through `Arc`s; spawn [`run`] as a
/// task per projection. [`trigger`] is public so callers (and tests) can
/// run one catch-up cycle on demand without the scheduler.
///
/// [`run`]: ProjectionRunner::run
/// [`trigger`]: ProjectionRunner::trigger
pub struct ProjectionRunner {
    projection: Arc<dyn Projection>,
    store: Arc<dyn EventStore>,
    executor: Arc<dyn StatementExecutor>,
    instance_id: InstanceId,
    config: RunnerConfig,
    wake: WakeSignal,
    shutdown: watch::Receiver<bool>,
}

impl ProjectionRunner {
    /// Create a runner and the sender used to shut it down gracefully.
    #[must_use]
    pub fn new(
        projection: Arc<dyn Projection>,
        store: Arc<dyn EventStore>,
        executor: Arc<dyn StatementExecutor>,
        instance_id: InstanceId,
        config: RunnerConfig,
        wake: WakeSignal,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = Self {
            projection,
            store,
            executor,
            instance_id,
            config,
            wake,
            shutdown: shutdown_rx,
        };

        (runner, shutdown_tx)
    }

    /// The filter selecting this projection's slice of the event stream,
    /// starting after `position`.
    ///
    /// The filter is the union of the declared aggregate types and event
    /// types — a superset of the declared pairs. Reduction drops the few
    /// cross-pair events the union lets through.
    fn filter(&self, position: Sequence) -> EventFilter {
        let interests = self.projection.interests();
        let mut aggregate_types: Vec<String> = Vec::new();
        let mut event_types: Vec<String> = Vec::new();
        for interest in interests {
            let aggregate_type = interest.aggregate_type.as_str().to_string();
            if !aggregate_types.contains(&aggregate_type) {
                aggregate_types.push(aggregate_type);
            }
            let event_type = interest.event_type.as_str().to_string();
            if !event_types.contains(&event_type) {
                event_types.push(event_type);
            }
        }

        EventFilter::new(self.instance_id.clone())
            .aggregate_types(aggregate_types)
            .event_types(event_types)
            .after_sequence(position)
            .limit(self.config.bulk_limit)
    }

    /// Run one catch-up cycle: fetch, reduce, and apply batches until the
    /// filtered stream is drained. Returns the number of events processed.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] when fetching, reducing, or applying
    /// fails. The position is only advanced past batches that committed, so
    /// calling `trigger` again retries from the failed batch's start.
    pub async fn trigger(&self) -> Result<u64, ProjectionError> {
        let name = self.projection.name();
        let mut processed = 0_u64;

        loop {
            tracing::trace!(projection = name, phase = ?Phase::Fetching, "fetching batch");
            let position = self
                .executor
                .position(name)
                .await?
                .map_or(Sequence::INITIAL, |position| position.sequence);

            let events = self
                .store
                .query(self.filter(position))
                .await
                .map_err(|error| ProjectionError::Storage(error.to_string()))?;
            if events.is_empty() {
                break;
            }

            tracing::trace!(
                projection = name,
                phase = ?Phase::Reducing,
                batch = events.len(),
                "reducing batch"
            );
            let mut statements: Vec<Statement> = Vec::new();
            for event in &events {
                statements.extend(self.projection.reduce(event)?);
            }

            // The batch's final sequence becomes the new position; both
            // commit in one transaction.
            let last_sequence = events
                .last()
                .map_or(position, |event| event.sequence);

            tracing::trace!(
                projection = name,
                phase = ?Phase::Applying,
                statements = statements.len(),
                "applying batch"
            );
            self.executor
                .execute(name, &statements, Position::new(last_sequence, Utc::now()))
                .await?;

            processed += events.len() as u64;
        }

        Ok(processed)
    }

    /// Run until shutdown: poll on the schedule, wake on the signal, retry
    /// failed batches with backoff.
    pub async fn run(mut self) {
        let name = self.projection.name();
        tracing::info!(
            projection = name,
            instance = %self.instance_id,
            "starting projection runner"
        );

        let mut attempt = 0_usize;
        while !*self.shutdown.borrow() {
            match self.trigger().await {
                Ok(processed) => {
                    attempt = 0;
                    if processed > 0 {
                        tracing::debug!(projection = name, processed, "caught up");
                    }

                    tokio::select! {
                        () = tokio::time::sleep(self.config.requeue_every) => {}
                        () = self.wake.wait() => {}
                        _ = self.shutdown.changed() => {}
                    }
                }
                Err(error) => {
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    attempt += 1;
                    tracing::error!(
                        projection = name,
                        error = %error,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "batch failed, position unchanged, retrying"
                    );

                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.changed() => {}
                    }
                }
            }
        }

        tracing::info!(projection = name, "projection runner stopped");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)] // Test assertions use expect for clear failure messages

    use super::*;
    use identra_core::aggregate::{Aggregate, AggregateId, AggregateType, ResourceOwner};
    use identra_core::event::{EventType, NewEvent};
    use identra_domain::OrgMemberProjection;
    use identra_domain::projection::org_member;
    use identra_testing::{InMemoryEventStore, InMemoryExecutor};

    fn org_aggregate(org_id: &str) -> Aggregate {
        Aggregate::new(
            InstanceId::new("instance-1"),
            AggregateType::new("org"),
            AggregateId::new(org_id),
            ResourceOwner::new(org_id),
        )
    }

    fn runner(
        store: &InMemoryEventStore,
        executor: &InMemoryExecutor,
    ) -> (ProjectionRunner, watch::Sender<bool>) {
        ProjectionRunner::new(
            Arc::new(OrgMemberProjection),
            Arc::new(store.clone()),
            Arc::new(executor.clone()),
            InstanceId::new("instance-1"),
            RunnerConfig {
                requeue_every: Duration::from_millis(20),
                bulk_limit: 2,
                retry: RetryPolicy {
                    initial_delay: Duration::from_millis(5),
                    max_delay: Duration::from_millis(50),
                    multiplier: 2.0,
                },
            },
            WakeSignal::new(),
        )
    }

    async fn add_member(store: &InMemoryEventStore, org_id: &str, user_id: &str, expected: u64) {
        store
            .append(
                org_aggregate(org_id),
                Sequence::new(expected),
                vec![NewEvent::new(
                    EventType::new("org.member.added"),
                    serde_json::json!({
                        "userId": user_id,
                        "roles": ["role"],
                        "userResourceOwner": org_id,
                    }),
                )],
            )
            .await
            .expect("append should succeed");
    }

    #[tokio::test]
    async fn trigger_materializes_rows_and_position() {
        let store = InMemoryEventStore::new();
        let executor = InMemoryExecutor::new();
        add_member(&store, "org-1", "user-1", 0).await;

        let (runner, _shutdown) = runner(&store, &executor);
        let processed = runner.trigger().await.expect("trigger should succeed");

        assert_eq!(processed, 1);
        assert_eq!(executor.rows(org_member::TABLE).len(), 1);
        assert_eq!(
            executor
                .committed_position("org_members")
                .expect("position should be committed")
                .sequence,
            Sequence::new(1)
        );
    }

    #[tokio::test]
    async fn trigger_drains_in_bulk_limited_batches() {
        let store = InMemoryEventStore::new();
        let executor = InMemoryExecutor::new();
        add_member(&store, "org-1", "user-1", 0).await;
        add_member(&store, "org-1", "user-2", 1).await;
        add_member(&store, "org-1", "user-3", 2).await;

        let (runner, _shutdown) = runner(&store, &executor);
        // bulk_limit is 2, so this drains in two batches within one trigger.
        let processed = runner.trigger().await.expect("trigger should succeed");

        assert_eq!(processed, 3);
        assert_eq!(executor.rows(org_member::TABLE).len(), 3);
        assert_eq!(
            executor
                .committed_position("org_members")
                .expect("position should be committed")
                .sequence,
            Sequence::new(3)
        );
    }

    #[tokio::test]
    async fn retrigger_after_catch_up_is_a_no_op() {
        let store = InMemoryEventStore::new();
        let executor = InMemoryExecutor::new();
        add_member(&store, "org-1", "user-1", 0).await;

        let (runner, _shutdown) = runner(&store, &executor);
        runner.trigger().await.expect("trigger should succeed");
        let rows_after_first = executor.rows(org_member::TABLE);

        let processed = runner.trigger().await.expect("trigger should succeed");

        assert_eq!(processed, 0);
        assert_eq!(executor.rows(org_member::TABLE), rows_after_first);
    }

    #[tokio::test]
    async fn failed_batch_leaves_position_and_is_retried_from_same_point() {
        let store = InMemoryEventStore::new();
        let executor = InMemoryExecutor::new();
        add_member(&store, "org-1", "user-1", 0).await;

        let (runner, _shutdown) = runner(&store, &executor);
        executor.fail_next(1);

        let result = runner.trigger().await;
        assert!(result.is_err());
        assert!(executor.rows(org_member::TABLE).is_empty());
        assert_eq!(executor.committed_position("org_members"), None);

        // Same batch, same starting point, applied exactly once.
        let processed = runner.trigger().await.expect("retry should succeed");
        assert_eq!(processed, 1);
        assert_eq!(executor.rows(org_member::TABLE).len(), 1);
    }

    #[tokio::test]
    async fn run_loop_processes_wakes_and_shuts_down() {
        let store = InMemoryEventStore::new();
        let executor = InMemoryExecutor::new();
        let wake = WakeSignal::new();

        let (runner, shutdown) = ProjectionRunner::new(
            Arc::new(OrgMemberProjection),
            Arc::new(store.clone()),
            Arc::new(executor.clone()),
            InstanceId::new("instance-1"),
            RunnerConfig {
                requeue_every: Duration::from_secs(3600), // only the wake can trigger
                bulk_limit: 200,
                retry: RetryPolicy::default(),
            },
            wake.clone(),
        );
        let handle = tokio::spawn(runner.run());

        add_member(&store, "org-1", "user-1", 0).await;
        wake.wake();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while executor.rows(org_member::TABLE).is_empty() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "runner did not materialize the row in time"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown.send(true).expect("runner should still listen");
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("runner should stop after shutdown")
            .expect("runner task should not panic");
    }

    #[tokio::test]
    async fn cross_aggregate_cascade_flows_through_the_runner() {
        let store = InMemoryEventStore::new();
        let executor = InMemoryExecutor::new();
        add_member(&store, "org-1", "user-1", 0).await;

        // The user aggregate lives elsewhere; its removal cascades into the
        // membership read model.
        store
            .append(
                Aggregate::new(
                    InstanceId::new("instance-1"),
                    AggregateType::new("user"),
                    AggregateId::new("user-1"),
                    ResourceOwner::new("org-2"),
                ),
                Sequence::INITIAL,
                vec![NewEvent::new(
                    EventType::new("user.removed"),
                    serde_json::json!({}),
                )],
            )
            .await
            .expect("append should succeed");

        let (runner, _shutdown) = runner(&store, &executor);
        runner.trigger().await.expect("trigger should succeed");

        assert!(executor.rows(org_member::TABLE).is_empty());
    }
}
