//! PostgreSQL statement executor and position store.

use chrono::{DateTime, Utc};
use identra_core::aggregate::Sequence;
use identra_core::projection::{Position, ProjectionError, StatementExecutor};
use identra_core::statement::{Cond, Statement, Value};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;

fn storage_error(error: sqlx::Error) -> ProjectionError {
    ProjectionError::Storage(error.to_string())
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Text(text) => query.bind(text),
        Value::Bool(flag) => query.bind(flag),
        Value::BigInt(number) => query.bind(number),
        Value::TextArray(items) => query.bind(items),
        Value::Timestamp(timestamp) => query.bind(timestamp),
        Value::Json(json) => query.bind(json),
        Value::Null => query.bind(Option::<String>::None),
    }
}

fn push_conds(sql: &mut String, conds: &[Cond], mut next_placeholder: usize) {
    sql.push_str(" WHERE ");
    for (index, cond) in conds.iter().enumerate() {
        if index > 0 {
            sql.push_str(" AND ");
        }
        let _ = write!(sql, "({} = ${next_placeholder})", cond.column);
        next_placeholder += 1;
    }
}

/// Render one statement to SQL. Table and column names come from the
/// projections' own constants, never from input, so interpolating them is
/// safe; all values go through binds.
fn statement_sql(statement: &Statement) -> String {
    match statement {
        Statement::Insert {
            table,
            key,
            columns,
        } => {
            let names: Vec<&str> = columns.iter().map(|column| column.name).collect();
            let placeholders: Vec<String> =
                (1..=columns.len()).map(|index| format!("${index}")).collect();
            let updates: Vec<String> = columns
                .iter()
                .filter(|column| !key.contains(&column.name))
                .map(|column| format!("{0} = EXCLUDED.{0}", column.name))
                .collect();

            // Upsert on the key columns keeps re-delivered inserts harmless.
            let conflict_action = if updates.is_empty() {
                "DO NOTHING".to_string()
            } else {
                format!("DO UPDATE SET {}", updates.join(", "))
            };
            format!(
                "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT ({}) {conflict_action}",
                names.join(", "),
                placeholders.join(", "),
                key.join(", "),
            )
        }
        Statement::Update {
            table,
            columns,
            conds,
        } => {
            let assignments: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(index, column)| format!("{} = ${}", column.name, index + 1))
                .collect();
            let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));
            push_conds(&mut sql, conds, columns.len() + 1);
            sql
        }
        Statement::Delete { table, conds } => {
            let mut sql = format!("DELETE FROM {table}");
            push_conds(&mut sql, conds, 1);
            sql
        }
    }
}

/// PostgreSQL-backed [`StatementExecutor`].
///
/// A batch of statements and the position advance commit in a single
/// transaction: either the read model reflects the whole batch and the
/// position points past it, or neither happened. An interrupted run leaves
/// the read model consistent with the last committed position, and the
/// next run retries from there.
#[derive(Clone)]
pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the given database.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, ProjectionError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
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

    async fn execute_tx(
        &self,
        projection_name: &str,
        statements: &[Statement],
        position: Position,
    ) -> Result<(), ProjectionError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        for statement in statements {
            let sql = statement_sql(statement);
            let mut query = sqlx::query(&sql);
            match statement {
                Statement::Insert { columns, .. } => {
                    for column in columns {
                        query = bind_value(query, &column.value);
                    }
                }
                Statement::Update { columns, conds, .. } => {
                    for column in columns {
                        query = bind_value(query, &column.value);
                    }
                    for cond in conds {
                        query = bind_value(query, &cond.value);
                    }
                }
                Statement::Delete { conds, .. } => {
                    for cond in conds {
                        query = bind_value(query, &cond.value);
                    }
                }
            }
            query.execute(&mut *tx).await.map_err(storage_error)?;
        }

        #[allow(clippy::cast_possible_wrap)]
        let sequence = position.sequence.value() as i64;
        sqlx::query(
            "INSERT INTO projections.positions
             (projection_name, position_sequence, position_timestamp, updated_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (projection_name) DO UPDATE
             SET position_sequence = EXCLUDED.position_sequence,
                 position_timestamp = EXCLUDED.position_timestamp,
                 updated_at = now()",
        )
        .bind(projection_name)
        .bind(sequence)
        .bind(position.timestamp)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        tracing::debug!(
            projection = projection_name,
            statements = statements.len(),
            sequence,
            "batch applied"
        );
        Ok(())
    }

    async fn load_position(
        &self,
        projection_name: &str,
    ) -> Result<Option<Position>, ProjectionError> {
        let row = sqlx::query(
            "SELECT position_sequence, position_timestamp
             FROM projections.positions
             WHERE projection_name = $1",
        )
        .bind(projection_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(|row| {
            let sequence: i64 = row.try_get("position_sequence").map_err(storage_error)?;
            let timestamp: DateTime<Utc> =
                row.try_get("position_timestamp").map_err(storage_error)?;
            #[allow(clippy::cast_sign_loss)] // Sequences are always positive in storage
            let sequence = sequence as u64;
            Ok(Position::new(Sequence::new(sequence), timestamp))
        })
        .transpose()
    }
}

impl StatementExecutor for PostgresExecutor {
    fn execute(
        &self,
        projection_name: &str,
        statements: &[Statement],
        position: Position,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        let statements = statements.to_vec();
        Box::pin(async move {
            self.execute_tx(&projection_name, &statements, position)
                .await
        })
    }

    fn position(
        &self,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Position>, ProjectionError>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move { self.load_position(&projection_name).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use identra_core::statement::Column;

    #[test]
    fn insert_renders_upsert_on_key() {
        let statement = Statement::insert(
            "projections.org_members",
            &["user_id", "org_id"],
            vec![
                Column::new("user_id", Value::text("user-1")),
                Column::new("org_id", Value::text("org-1")),
                Column::new("roles", Value::text_array(["role"])),
            ],
        );

        assert_eq!(
            statement_sql(&statement),
            "INSERT INTO projections.org_members (user_id, org_id, roles) \
             VALUES ($1, $2, $3) ON CONFLICT (user_id, org_id) \
             DO UPDATE SET roles = EXCLUDED.roles"
        );
    }

    #[test]
    fn insert_of_key_only_row_renders_do_nothing() {
        let statement = Statement::insert(
            "t",
            &["id"],
            vec![Column::new("id", Value::text("1"))],
        );

        assert_eq!(
            statement_sql(&statement),
            "INSERT INTO t (id) VALUES ($1) ON CONFLICT (id) DO NOTHING"
        );
    }

    #[test]
    fn update_renders_set_and_predicates() {
        let statement = Statement::update(
            "projections.org_members",
            vec![
                Column::new("roles", Value::text_array(["role", "changed"])),
                Column::new("sequence", Value::BigInt(15)),
            ],
            vec![
                Cond::new("user_id", Value::text("user-id")),
                Cond::new("org_id", Value::text("agg-id")),
            ],
        );

        assert_eq!(
            statement_sql(&statement),
            "UPDATE projections.org_members SET roles = $1, sequence = $2 \
             WHERE (user_id = $3) AND (org_id = $4)"
        );
    }

    #[test]
    fn delete_renders_predicates() {
        let statement = Statement::delete(
            "projections.org_members",
            vec![Cond::new("user_id", Value::text("user-id"))],
        );

        assert_eq!(
            statement_sql(&statement),
            "DELETE FROM projections.org_members WHERE (user_id = $1)"
        );
    }
}
