//! # Identra Postgres
//!
//! PostgreSQL persistence for the Identra engine:
//!
//! - [`PostgresEventStore`]: the append-only event log with conditional
//!   append (compare against the stream's current maximum sequence) and
//!   filtered range queries
//! - [`PostgresExecutor`]: transactional execution of read-model statement
//!   batches together with the projection position advance
//!
//! The relational schema is static and ships as `schema.sql` at the crate
//! root; migration tooling is deliberately out of scope.
//!
//! ## Example
//!
//! ```ignore
//! use identra_postgres::{PostgresEventStore, PostgresExecutor};
//!
//! let store = PostgresEventStore::connect("postgres://localhost/identra").await?;
//! store.apply_schema().await?;
//! let executor = PostgresExecutor::new(store.pool().clone());
//! ```

mod event_store;
mod executor;

pub use event_store::PostgresEventStore;
pub use executor::PostgresExecutor;
