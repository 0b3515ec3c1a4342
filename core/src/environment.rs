//! Injected environment dependencies.
//!
//! Command handlers take time and identifiers from these traits instead of
//! reaching for global state, so tests can make both deterministic (see
//! `FixedClock` and `SequentialIdGenerator` in `identra-testing`).

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// System clock backed by [`Utc::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Generator of new aggregate identifiers.
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh, globally-unique identifier.
    fn generate(&self) -> String;
}

/// Production id generator backed by UUID v4.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
