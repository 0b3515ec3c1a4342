//! # Identra Testing
//!
//! Testing utilities and in-memory backends for the Identra engine:
//!
//! - [`InMemoryEventStore`]: event log with real optimistic-concurrency
//!   semantics, no database required
//! - [`InMemoryExecutor`]: transactional-in-spirit statement executor with
//!   failure injection for runner retry tests
//! - [`FixedClock`] and [`SequentialIdGenerator`]: deterministic time and
//!   ids for reproducible command tests
//! - [`ProjectionTestHarness`]: fluent API for reducing events into an
//!   in-memory read model and asserting on the rows
//!
//! ## Example
//!
//! ```
//! use identra_core::environment::Clock;
//! use identra_testing::test_clock;
//!
//! let clock = test_clock();
//! assert_eq!(clock.now(), clock.now()); // Always the same!
//! ```

mod event_store;
mod executor;
mod harness;

pub use event_store::InMemoryEventStore;
pub use executor::{InMemoryExecutor, Row};
pub use harness::ProjectionTestHarness;

use chrono::{DateTime, Utc};
use identra_core::environment::{Clock, IdGenerator};
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed clock for deterministic tests.
///
/// Always returns the same time, making tests reproducible.
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time.
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
///
/// # Panics
///
/// This function will panic if the hardcoded timestamp fails to parse,
/// which should never happen in practice.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

/// Id generator producing `id-1`, `id-2`, … for predictable assertions.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    /// Create a generator starting at `id-1`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("id-{n}")
    }
}

/// Install a compact `tracing` subscriber for a test binary.
///
/// Safe to call from several tests; only the first call installs.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_fixed() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn sequential_ids_are_predictable() {
        let generator = SequentialIdGenerator::new();
        assert_eq!(generator.generate(), "id-1");
        assert_eq!(generator.generate(), "id-2");
    }
}
