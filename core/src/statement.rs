//! Abstract read-model write statements.
//!
//! Projections reduce events into [`Statement`]s — storage-agnostic
//! descriptions of inserts, updates, and deletes against read-model tables.
//! The statements are *descriptions*, not executions: a statement executor
//! (PostgreSQL in production, in-memory in tests) applies a batch of them
//! inside a single transaction together with the projection's position
//! advance.
//!
//! # Idempotency
//!
//! Batches may be re-applied after a crash between commit and position
//! advance, so every statement must be harmless to repeat:
//!
//! - `Insert` is executed as an upsert on the table's key columns —
//!   re-inserting an existing key overwrites it with identical values
//! - `Update`/`Delete` address rows by key predicates — repeating them
//!   rewrites the same values or deletes nothing
//!
//! # Example
//!
//! ```
//! use identra_core::statement::{Column, Cond, Statement, Value};
//!
//! let insert = Statement::insert(
//!     "projections.org_members",
//!     &["user_id", "org_id"],
//!     vec![
//!         Column::new("user_id", Value::text("user-1")),
//!         Column::new("org_id", Value::text("org-1")),
//!         Column::new("roles", Value::text_array(["ORG_OWNER"])),
//!     ],
//! );
//! assert_eq!(insert.table(), "projections.org_members");
//! ```

use crate::aggregate::Sequence;
use chrono::{DateTime, Utc};
use smallvec::SmallVec;

/// A value bound into a statement column or predicate.
///
/// The closed set of variants covers every column type the read models use;
/// executors map them to their storage's native types (and the in-memory
/// executor compares them structurally).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// UTF-8 text.
    Text(String),
    /// Boolean flag (tombstones and the like).
    Bool(bool),
    /// 64-bit signed integer; sequences are stored through this variant.
    BigInt(i64),
    /// Array of text values (e.g. role lists).
    TextArray(Vec<String>),
    /// Timestamp with time zone.
    Timestamp(DateTime<Utc>),
    /// Arbitrary JSON document.
    Json(serde_json::Value),
    /// SQL NULL.
    Null,
}

impl Value {
    /// Text value from anything string-like.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Text-array value from an iterator of string-likes.
    #[must_use]
    pub fn text_array<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::TextArray(values.into_iter().map(Into::into).collect())
    }
}

impl From<Sequence> for Value {
    /// Sequences are persisted as `BIGINT`.
    ///
    /// The wrap at `2^63` events is not a realistic concern for any stream.
    #[allow(clippy::cast_possible_wrap)]
    fn from(sequence: Sequence) -> Self {
        Self::BigInt(sequence.value() as i64)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A named column with its value, as written by `Insert`/`Update`.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: &'static str,
    /// Value to write.
    pub value: Value,
}

impl Column {
    /// Create a column assignment.
    #[must_use]
    pub fn new(name: &'static str, value: impl Into<Value>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// An equality predicate on one column, as used by `Update`/`Delete`.
///
/// All read-model predicates are conjunctions of equalities on key or
/// cascade columns; richer predicates are deliberately not expressible.
#[derive(Clone, Debug, PartialEq)]
pub struct Cond {
    /// Column name.
    pub column: &'static str,
    /// Value the column must equal.
    pub value: Value,
}

impl Cond {
    /// Create an equality condition.
    #[must_use]
    pub fn new(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }
}

/// One abstract write operation against a read-model table.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    /// Insert a row, upserting on the table's key columns.
    Insert {
        /// Target table.
        table: &'static str,
        /// Columns identifying the row (the upsert conflict target).
        key: &'static [&'static str],
        /// All column values, key columns included.
        columns: Vec<Column>,
    },
    /// Update columns on the rows matching all conditions.
    Update {
        /// Target table.
        table: &'static str,
        /// Columns to write.
        columns: Vec<Column>,
        /// Conjunctive equality predicates selecting the rows.
        conds: Vec<Cond>,
    },
    /// Delete the rows matching all conditions.
    Delete {
        /// Target table.
        table: &'static str,
        /// Conjunctive equality predicates selecting the rows.
        conds: Vec<Cond>,
    },
}

impl Statement {
    /// Create an insert statement.
    #[must_use]
    pub const fn insert(
        table: &'static str,
        key: &'static [&'static str],
        columns: Vec<Column>,
    ) -> Self {
        Self::Insert {
            table,
            key,
            columns,
        }
    }

    /// Create an update statement.
    #[must_use]
    pub const fn update(table: &'static str, columns: Vec<Column>, conds: Vec<Cond>) -> Self {
        Self::Update {
            table,
            columns,
            conds,
        }
    }

    /// Create a delete statement.
    #[must_use]
    pub const fn delete(table: &'static str, conds: Vec<Cond>) -> Self {
        Self::Delete { table, conds }
    }

    /// The table this statement writes to.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                *table
            }
        }
    }
}

/// The statements produced by reducing one event.
///
/// Most reductions yield zero or one statement; cascades yield a fixed
/// small list (e.g. the two tombstone updates of an org removal), so the
/// list is inlined up to two entries.
pub type Statements = SmallVec<[Statement; 2]>;
