//! Fluent test harness for projections.

use crate::executor::{InMemoryExecutor, Row};
use chrono::Utc;
use identra_core::event::Event;
use identra_core::projection::{Position, Projection, ProjectionError, StatementExecutor};
use identra_core::statement::Value;

/// Test harness reducing events through a projection into an
/// [`InMemoryExecutor`] and asserting on the resulting rows.
///
/// # Example
///
/// ```ignore
/// let mut harness = ProjectionTestHarness::new(OrgMemberProjection);
/// harness.given_events(&[member_added]).await?;
/// harness.then_row_count(1);
/// ```
pub struct ProjectionTestHarness<P: Projection> {
    projection: P,
    executor: InMemoryExecutor,
}

impl<P: Projection> ProjectionTestHarness<P> {
    /// Create a harness with a fresh, empty executor.
    #[must_use]
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            executor: InMemoryExecutor::new(),
        }
    }

    /// Reduce and apply a series of events, each as its own batch.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if reduction or application fails.
    pub async fn given_events(&mut self, events: &[Event]) -> Result<&mut Self, ProjectionError> {
        for event in events {
            let statements = self.projection.reduce(event)?;
            self.executor
                .execute(
                    self.projection.name(),
                    &statements,
                    Position::new(event.sequence, Utc::now()),
                )
                .await?;
        }
        Ok(self)
    }

    /// Rows of the projection's table.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.executor.rows(table)
    }

    /// Find the rows whose `column` equals a text `value`.
    #[must_use]
    pub fn rows_where(&self, table: &str, column: &'static str, value: &str) -> Vec<Row> {
        self.executor
            .rows(table)
            .into_iter()
            .filter(|row| row.get(column) == Some(&Value::text(value)))
            .collect()
    }

    /// The underlying executor, for custom assertions.
    #[must_use]
    pub const fn executor(&self) -> &InMemoryExecutor {
        &self.executor
    }

    /// The projection under test.
    #[must_use]
    pub const fn projection(&self) -> &P {
        &self.projection
    }
}
