//! In-memory statement executor for projection tests.

use identra_core::projection::{Position, ProjectionError, StatementExecutor};
use identra_core::statement::{Cond, Statement, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A read-model row: column name to value.
pub type Row = HashMap<&'static str, Value>;

#[derive(Default)]
struct State {
    tables: HashMap<&'static str, Vec<Row>>,
    positions: HashMap<String, Position>,
}

fn row_matches(row: &Row, conds: &[Cond]) -> bool {
    conds
        .iter()
        .all(|cond| row.get(cond.column) == Some(&cond.value))
}

fn apply(state: &mut State, statement: &Statement) {
    match statement {
        Statement::Insert {
            table,
            key,
            columns,
        } => {
            let row: Row = columns
                .iter()
                .map(|column| (column.name, column.value.clone()))
                .collect();
            let rows = state.tables.entry(*table).or_default();
            // Upsert on the key columns: re-inserting an existing key
            // overwrites the row instead of duplicating it.
            let key_conds: Vec<Cond> = key
                .iter()
                .filter_map(|name| {
                    row.get(name)
                        .map(|value| Cond::new(*name, value.clone()))
                })
                .collect();
            if let Some(existing) = rows.iter_mut().find(|r| row_matches(r, &key_conds)) {
                *existing = row;
            } else {
                rows.push(row);
            }
        }
        Statement::Update {
            table,
            columns,
            conds,
        } => {
            if let Some(rows) = state.tables.get_mut(table) {
                for row in rows.iter_mut().filter(|row| row_matches(row, conds)) {
                    for column in columns {
                        row.insert(column.name, column.value.clone());
                    }
                }
            }
        }
        Statement::Delete { table, conds } => {
            if let Some(rows) = state.tables.get_mut(table) {
                rows.retain(|row| !row_matches(row, conds));
            }
        }
    }
}

/// In-memory [`StatementExecutor`] applying statements to hash-map tables.
///
/// Mirrors the transactional semantics of the PostgreSQL executor: a batch
/// either applies completely and advances the position, or fails without
/// touching anything. Failures can be injected with [`fail_next`] to
/// exercise the runner's retry path.
///
/// [`fail_next`]: InMemoryExecutor::fail_next
#[derive(Clone, Default)]
pub struct InMemoryExecutor {
    state: Arc<Mutex<State>>,
    failures: Arc<AtomicUsize>,
}

impl InMemoryExecutor {
    /// Create an empty executor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` `execute` calls fail with a storage error,
    /// leaving tables and positions untouched.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Rows currently stored for `table`.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// The committed position of `projection_name`, if any batch was
    /// applied.
    #[must_use]
    pub fn committed_position(&self, projection_name: &str) -> Option<Position> {
        self.lock().positions.get(projection_name).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl StatementExecutor for InMemoryExecutor {
    fn execute(
        &self,
        projection_name: &str,
        statements: &[Statement],
        position: Position,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let result = if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            Err(ProjectionError::Storage(
                "injected storage failure".to_string(),
            ))
        } else {
            let mut state = self.lock();
            for statement in statements {
                apply(&mut state, statement);
            }
            state
                .positions
                .insert(projection_name.to_string(), position);
            Ok(())
        };
        Box::pin(async move { result })
    }

    fn position(
        &self,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Position>, ProjectionError>> + Send + '_>> {
        let position = self.committed_position(projection_name);
        Box::pin(async move { Ok(position) })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)] // Test assertions use expect for clear failure messages

    use super::*;
    use chrono::Utc;
    use identra_core::aggregate::Sequence;
    use identra_core::statement::Column;

    fn insert(user: &str, roles: &[&str]) -> Statement {
        Statement::insert(
            "projections.org_members",
            &["user_id", "org_id"],
            vec![
                Column::new("user_id", Value::text(user)),
                Column::new("org_id", Value::text("org-1")),
                Column::new("roles", Value::text_array(roles.iter().copied())),
            ],
        )
    }

    #[tokio::test]
    async fn batch_applies_and_advances_position() {
        let executor = InMemoryExecutor::new();
        let position = Position::new(Sequence::new(3), Utc::now());

        executor
            .execute("org_members", &[insert("user-1", &["role"])], position)
            .await
            .expect("execute should succeed");

        assert_eq!(executor.rows("projections.org_members").len(), 1);
        assert_eq!(executor.committed_position("org_members"), Some(position));
    }

    #[tokio::test]
    async fn reapplying_a_batch_is_idempotent() {
        let executor = InMemoryExecutor::new();
        let position = Position::new(Sequence::new(3), Utc::now());
        let batch = [insert("user-1", &["role"])];

        executor
            .execute("org_members", &batch, position)
            .await
            .expect("execute should succeed");
        let after_first = executor.rows("projections.org_members");

        executor
            .execute("org_members", &batch, position)
            .await
            .expect("execute should succeed");
        let after_second = executor.rows("projections.org_members");

        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn injected_failure_leaves_state_untouched() {
        let executor = InMemoryExecutor::new();
        executor.fail_next(1);

        let result = executor
            .execute(
                "org_members",
                &[insert("user-1", &["role"])],
                Position::new(Sequence::new(3), Utc::now()),
            )
            .await;

        assert!(result.is_err());
        assert!(executor.rows("projections.org_members").is_empty());
        assert_eq!(executor.committed_position("org_members"), None);

        // The failure budget is spent; the retry goes through.
        executor
            .execute(
                "org_members",
                &[insert("user-1", &["role"])],
                Position::new(Sequence::new(3), Utc::now()),
            )
            .await
            .expect("retry should succeed");
        assert_eq!(executor.rows("projections.org_members").len(), 1);
    }

    #[tokio::test]
    async fn delete_of_absent_rows_is_harmless() {
        let executor = InMemoryExecutor::new();

        executor
            .execute(
                "org_members",
                &[Statement::delete(
                    "projections.org_members",
                    vec![Cond::new("user_id", Value::text("ghost"))],
                )],
                Position::new(Sequence::new(1), Utc::now()),
            )
            .await
            .expect("execute should succeed");

        assert!(executor.rows("projections.org_members").is_empty());
    }
}
