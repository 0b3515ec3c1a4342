//! Tests for the projection testing utilities.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use chrono::Utc;
use identra_core::aggregate::{
    Aggregate, AggregateId, AggregateType, InstanceId, ResourceOwner, Sequence,
};
use identra_core::event::{Editor, Event, EventType};
use identra_core::projection::{Interest, Position, Projection, ProjectionError, StatementExecutor};
use identra_core::statement::{Column, Cond, Statement, Statements, Value};
use identra_testing::{InMemoryExecutor, ProjectionTestHarness};

// Simple projection for exercising the harness: one row per document.
#[derive(Clone, Copy, Debug)]
struct DocumentProjection;

const TABLE: &str = "projections.documents";

impl Projection for DocumentProjection {
    fn name(&self) -> &'static str {
        "documents"
    }

    fn interests(&self) -> Vec<Interest> {
        vec![
            Interest::new("document", "document.created"),
            Interest::new("document", "document.updated"),
            Interest::new("document", "document.deleted"),
        ]
    }

    fn reduce(&self, event: &Event) -> Result<Statements, ProjectionError> {
        let mut statements = Statements::new();
        let id = Value::text(event.aggregate.id.as_str());

        if event.event_type == "document.created" {
            statements.push(Statement::insert(
                TABLE,
                &["id"],
                vec![
                    Column::new("id", id),
                    Column::new("data", Value::Json(event.payload.clone())),
                    Column::new("sequence", event.sequence),
                ],
            ));
        } else if event.event_type == "document.updated" {
            statements.push(Statement::update(
                TABLE,
                vec![
                    Column::new("data", Value::Json(event.payload.clone())),
                    Column::new("sequence", event.sequence),
                ],
                vec![Cond::new("id", id)],
            ));
        } else if event.event_type == "document.deleted" {
            statements.push(Statement::delete(TABLE, vec![Cond::new("id", id)]));
        }

        Ok(statements)
    }
}

fn document_event(id: &str, event_type: &str, sequence: u64, payload: serde_json::Value) -> Event {
    Event {
        aggregate: Aggregate::new(
            InstanceId::new("instance-1"),
            AggregateType::new("document"),
            AggregateId::new(id),
            ResourceOwner::new("org-1"),
        ),
        event_type: EventType::new(event_type),
        sequence: Sequence::new(sequence),
        creation_date: Utc::now(),
        payload,
        editor: Editor::default(),
    }
}

#[tokio::test]
async fn harness_applies_create_update_delete() {
    let mut harness = ProjectionTestHarness::new(DocumentProjection);

    harness
        .given_events(&[
            document_event("doc-1", "document.created", 1, serde_json::json!({"v": 1})),
            document_event("doc-2", "document.created", 2, serde_json::json!({"v": 1})),
            document_event("doc-1", "document.updated", 3, serde_json::json!({"v": 2})),
            document_event("doc-2", "document.deleted", 4, serde_json::json!({})),
        ])
        .await
        .expect("events should apply");

    let rows = harness.rows(TABLE);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&Value::text("doc-1")));
    assert_eq!(
        rows[0].get("data"),
        Some(&Value::Json(serde_json::json!({"v": 2})))
    );

    assert_eq!(harness.rows_where(TABLE, "id", "doc-2").len(), 0);
}

#[tokio::test]
async fn harness_tracks_the_projection_position() {
    let mut harness = ProjectionTestHarness::new(DocumentProjection);

    harness
        .given_events(&[document_event(
            "doc-1",
            "document.created",
            7,
            serde_json::json!({}),
        )])
        .await
        .expect("events should apply");

    let position = harness
        .executor()
        .committed_position(harness.projection().name())
        .expect("position should be committed");
    assert_eq!(position.sequence, Sequence::new(7));
}

#[tokio::test]
async fn executor_batches_are_all_or_nothing() {
    let executor = InMemoryExecutor::new();
    let projection = DocumentProjection;
    let event = document_event("doc-1", "document.created", 1, serde_json::json!({}));
    let statements = projection.reduce(&event).expect("reduce should succeed");

    executor.fail_next(1);
    let failed = executor
        .execute(
            projection.name(),
            &statements,
            Position::new(event.sequence, Utc::now()),
        )
        .await;
    assert!(failed.is_err());
    assert!(executor.rows(TABLE).is_empty());
    assert!(executor.committed_position(projection.name()).is_none());

    executor
        .execute(
            projection.name(),
            &statements,
            Position::new(event.sequence, Utc::now()),
        )
        .await
        .expect("retry should succeed");
    assert_eq!(executor.rows(TABLE).len(), 1);
}

#[tokio::test]
async fn upsert_makes_redelivered_creates_harmless() {
    let mut harness = ProjectionTestHarness::new(DocumentProjection);
    let create = document_event("doc-1", "document.created", 1, serde_json::json!({"v": 1}));

    harness
        .given_events(&[create.clone(), create])
        .await
        .expect("events should apply");

    assert_eq!(harness.rows(TABLE).len(), 1);
}
