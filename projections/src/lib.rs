//! # Identra Projections
//!
//! The projection runner for the Identra engine.
//!
//! Projections are the read side: each one consumes a filtered subset of
//! the event stream and materializes a relational read model through
//! idempotent statements. This crate supplies the machinery that drives
//! them:
//!
//! - [`ProjectionRunner`]: per-projection poll loop with position tracking,
//!   bounded batches, wake signals, and graceful shutdown
//! - [`RunnerConfig`]: scheduling and batching knobs
//! - [`RetryPolicy`]: exponential backoff for failed batches, which are
//!   retried indefinitely with the position unchanged
//!
//! Storage backends implement the `StatementExecutor` and `EventStore`
//! traits from `identra-core`; the production PostgreSQL implementations
//! live in `identra-postgres`, the in-memory ones in `identra-testing`.
//!
//! ## Eventual consistency
//!
//! Command callers never wait for projections: a command failure is
//! synchronous, a projection delay is invisible except as read-model
//! staleness bounded by storage and runner health.

pub mod retry;
pub mod runner;

pub use retry::RetryPolicy;
pub use runner::{ProjectionRunner, RunnerConfig};
