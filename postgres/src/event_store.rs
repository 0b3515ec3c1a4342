//! PostgreSQL event store.

use chrono::{DateTime, Utc};
use identra_core::aggregate::{
    Aggregate, AggregateId, AggregateType, InstanceId, ResourceOwner, Sequence,
};
use identra_core::event::{Editor, Event, EventType, NewEvent};
use identra_core::event_store::{EventFilter, EventStore, EventStoreError};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::future::Future;
use std::pin::Pin;

/// Sequences are persisted as `BIGINT`; the wrap at `2^63` events is not a
/// realistic concern for any instance.
#[allow(clippy::cast_possible_wrap)]
const fn sequence_to_i64(sequence: Sequence) -> i64 {
    sequence.value() as i64
}

#[allow(clippy::cast_sign_loss)] // Sequences are always positive in storage
const fn sequence_from_i64(value: i64) -> Sequence {
    Sequence::new(value as u64)
}

fn storage_error(error: sqlx::Error) -> EventStoreError {
    EventStoreError::Unavailable(error.to_string())
}

fn event_from_row(row: &PgRow) -> Result<Event, EventStoreError> {
    Ok(Event {
        aggregate: Aggregate::new(
            InstanceId::new(row.try_get::<String, _>("instance_id").map_err(storage_error)?),
            AggregateType::new(
                row.try_get::<String, _>("aggregate_type")
                    .map_err(storage_error)?,
            ),
            AggregateId::new(
                row.try_get::<String, _>("aggregate_id")
                    .map_err(storage_error)?,
            ),
            ResourceOwner::new(
                row.try_get::<String, _>("resource_owner")
                    .map_err(storage_error)?,
            ),
        ),
        event_type: EventType::new(row.try_get::<String, _>("event_type").map_err(storage_error)?),
        sequence: sequence_from_i64(row.try_get::<i64, _>("sequence").map_err(storage_error)?),
        creation_date: row
            .try_get::<DateTime<Utc>, _>("creation_date")
            .map_err(storage_error)?,
        payload: row
            .try_get::<serde_json::Value, _>("payload")
            .map_err(storage_error)?,
        editor: Editor::new(
            row.try_get::<String, _>("editor_service")
                .map_err(storage_error)?,
            row.try_get::<String, _>("editor_user").map_err(storage_error)?,
        ),
    })
}

/// PostgreSQL-backed [`EventStore`].
///
/// # Storage layout
///
/// Events live in `eventstore.events`, keyed by `(instance_id, sequence)`;
/// `eventstore.sequences` holds one per-instance counter row. See
/// `schema.sql` at the crate root for the full DDL — schema management is
/// out of scope here, the tables are expected to exist.
///
/// # Append protocol
///
/// Inside one transaction:
///
/// 1. Claim the next sequences by incrementing the instance's counter row
///    (`UPDATE … RETURNING`). The row lock serializes appends per instance
///    until commit, so commit order equals sequence order — which is what
///    lets projections use a single sequence watermark.
/// 2. Compare the aggregate stream's current maximum sequence against the
///    caller's expected sequence; on mismatch roll back and report a
///    conflict.
/// 3. Insert the events with the claimed sequences.
///
/// The conditional write happens at the storage layer, not behind an
/// application-level mutex, so it stays correct across process instances.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the given database.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Unavailable`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(storage_error)?;
        Ok(Self::new(pool))
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the static schema from `schema.sql`.
    ///
    /// Intended for tests and local bootstrapping; deployments apply the
    /// same file through their own tooling.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Unavailable`] if any DDL statement fails.
    pub async fn apply_schema(&self) -> Result<(), EventStoreError> {
        sqlx::raw_sql(include_str!("../schema.sql"))
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn append_tx(
        &self,
        aggregate: Aggregate,
        expected_sequence: Sequence,
        events: Vec<NewEvent>,
    ) -> Result<Vec<Event>, EventStoreError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(
            "INSERT INTO eventstore.sequences (instance_id, current_sequence)
             VALUES ($1, 0)
             ON CONFLICT (instance_id) DO NOTHING",
        )
        .bind(aggregate.instance_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        #[allow(clippy::cast_possible_wrap)]
        let claimed: i64 = sqlx::query_scalar(
            "UPDATE eventstore.sequences
             SET current_sequence = current_sequence + $2
             WHERE instance_id = $1
             RETURNING current_sequence",
        )
        .bind(aggregate.instance_id.as_str())
        .bind(events.len() as i64)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_error)?;

        let actual: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(sequence) FROM eventstore.events
             WHERE instance_id = $1 AND aggregate_type = $2 AND aggregate_id = $3",
        )
        .bind(aggregate.instance_id.as_str())
        .bind(aggregate.aggregate_type.as_str())
        .bind(aggregate.id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_error)?;
        let actual = actual.map_or(Sequence::INITIAL, sequence_from_i64);

        if actual != expected_sequence {
            tx.rollback().await.map_err(storage_error)?;
            return Err(EventStoreError::Conflict {
                aggregate,
                expected: expected_sequence,
                actual,
            });
        }

        let creation_date = Utc::now();
        #[allow(clippy::cast_possible_wrap)]
        let first_sequence = claimed - (events.len() as i64) + 1;

        let mut stored = Vec::with_capacity(events.len());
        for (offset, event) in events.into_iter().enumerate() {
            #[allow(clippy::cast_possible_wrap)]
            let sequence = first_sequence + offset as i64;

            sqlx::query(
                "INSERT INTO eventstore.events
                 (instance_id, sequence, aggregate_type, aggregate_id, resource_owner,
                  event_type, creation_date, payload, editor_service, editor_user)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(aggregate.instance_id.as_str())
            .bind(sequence)
            .bind(aggregate.aggregate_type.as_str())
            .bind(aggregate.id.as_str())
            .bind(aggregate.resource_owner.as_str())
            .bind(event.event_type.as_str())
            .bind(creation_date)
            .bind(&event.payload)
            .bind(&event.editor.service)
            .bind(&event.editor.user)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

            stored.push(Event {
                aggregate: aggregate.clone(),
                event_type: event.event_type,
                sequence: sequence_from_i64(sequence),
                creation_date,
                payload: event.payload,
                editor: event.editor,
            });
        }

        tx.commit().await.map_err(storage_error)?;
        tracing::debug!(
            aggregate = %aggregate,
            first_sequence,
            events = stored.len(),
            "events appended"
        );
        Ok(stored)
    }

    async fn query_rows(&self, filter: EventFilter) -> Result<Vec<Event>, EventStoreError> {
        let mut sql = String::from(
            "SELECT instance_id, sequence, aggregate_type, aggregate_id, resource_owner,
                    event_type, creation_date, payload, editor_service, editor_user
             FROM eventstore.events
             WHERE instance_id = $1",
        );
        let mut bind_index = 1;

        if !filter.aggregate_types.is_empty() {
            bind_index += 1;
            sql.push_str(&format!(" AND aggregate_type = ANY(${bind_index})"));
        }
        if !filter.aggregate_ids.is_empty() {
            bind_index += 1;
            sql.push_str(&format!(" AND aggregate_id = ANY(${bind_index})"));
        }
        if !filter.event_types.is_empty() {
            bind_index += 1;
            sql.push_str(&format!(" AND event_type = ANY(${bind_index})"));
        }
        if filter.after_sequence.is_some() {
            bind_index += 1;
            sql.push_str(&format!(" AND sequence > ${bind_index}"));
        }
        if filter.created_after.is_some() {
            bind_index += 1;
            sql.push_str(&format!(" AND creation_date >= ${bind_index}"));
        }
        sql.push_str(" ORDER BY sequence ASC");
        if filter.limit.is_some() {
            bind_index += 1;
            sql.push_str(&format!(" LIMIT ${bind_index}"));
        }

        let mut query = sqlx::query(&sql).bind(filter.instance_id.as_str().to_string());
        if !filter.aggregate_types.is_empty() {
            let types: Vec<String> = filter
                .aggregate_types
                .iter()
                .map(|t| t.as_str().to_string())
                .collect();
            query = query.bind(types);
        }
        if !filter.aggregate_ids.is_empty() {
            let ids: Vec<String> = filter
                .aggregate_ids
                .iter()
                .map(|id| id.as_str().to_string())
                .collect();
            query = query.bind(ids);
        }
        if !filter.event_types.is_empty() {
            let types: Vec<String> = filter
                .event_types
                .iter()
                .map(|t| t.as_str().to_string())
                .collect();
            query = query.bind(types);
        }
        if let Some(after) = filter.after_sequence {
            query = query.bind(sequence_to_i64(after));
        }
        if let Some(created_after) = filter.created_after {
            query = query.bind(created_after);
        }
        if let Some(limit) = filter.limit {
            #[allow(clippy::cast_possible_wrap)]
            let limit = limit as i64;
            query = query.bind(limit);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(storage_error)?;
        rows.iter().map(event_from_row).collect()
    }
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        aggregate: Aggregate,
        expected_sequence: Sequence,
        events: Vec<NewEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, EventStoreError>> + Send + '_>> {
        Box::pin(self.append_tx(aggregate, expected_sequence, events))
    }

    fn query(
        &self,
        filter: EventFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, EventStoreError>> + Send + '_>> {
        Box::pin(self.query_rows(filter))
    }
}
