//! Aggregate identity and sequence types.
//!
//! This module defines strong types for addressing an aggregate stream
//! (`InstanceId`, `AggregateType`, `AggregateId`, `ResourceOwner`) and for
//! per-stream ordering (`Sequence`) used in optimistic concurrency control.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the instance (deployment tenant) an aggregate belongs to.
///
/// Every aggregate stream is scoped to exactly one instance; all event
/// queries and appends carry the instance id so streams from different
/// instances never interleave.
///
/// # Examples
///
/// ```
/// use identra_core::aggregate::InstanceId;
///
/// let instance = InstanceId::new("instance-1");
/// assert_eq!(instance.as_str(), "instance-1");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    /// Create a new `InstanceId`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the instance id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a single aggregate instance within an aggregate type.
///
/// Combined with [`InstanceId`] and [`AggregateType`], this uniquely
/// identifies one aggregate stream in the event log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateId(String);

impl AggregateId {
    /// Create a new `AggregateId`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the aggregate id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AggregateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AggregateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The kind of aggregate a stream belongs to (e.g. `"org"`, `"user"`).
///
/// Aggregate types partition the event log: a stream is addressed by
/// `(instance, aggregate type, aggregate id)`, and projections declare which
/// aggregate types they consume. Domain crates define their type names as
/// `&str` constants and convert at the boundary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateType(String);

impl AggregateType {
    /// Create a new `AggregateType`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the aggregate type as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AggregateType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The organization that owns an aggregate.
///
/// Carried as metadata on every event so projections can derive cascade
/// predicates (e.g. tombstoning all rows owned by a removed organization)
/// without reading any other stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceOwner(String);

impl ResourceOwner {
    /// Create a new `ResourceOwner`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the resource owner as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceOwner {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The identity of one aggregate stream plus its owning organization.
///
/// An aggregate is a consistency boundary: all events sharing this identity
/// are totally ordered by [`Sequence`], and optimistic concurrency is
/// enforced per aggregate.
///
/// # Examples
///
/// ```
/// use identra_core::aggregate::{Aggregate, AggregateId, AggregateType, InstanceId, ResourceOwner};
///
/// let org = Aggregate::new(
///     InstanceId::new("instance-1"),
///     AggregateType::new("org"),
///     AggregateId::new("org-1"),
///     ResourceOwner::new("org-1"),
/// );
/// assert_eq!(org.aggregate_type.as_str(), "org");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aggregate {
    /// Instance the stream is scoped to.
    pub instance_id: InstanceId,
    /// Kind of aggregate.
    pub aggregate_type: AggregateType,
    /// Identity of this aggregate within its type.
    pub id: AggregateId,
    /// Organization owning this aggregate.
    pub resource_owner: ResourceOwner,
}

impl Aggregate {
    /// Create a new aggregate identity.
    #[must_use]
    pub const fn new(
        instance_id: InstanceId,
        aggregate_type: AggregateType,
        id: AggregateId,
        resource_owner: ResourceOwner,
    ) -> Self {
        Self {
            instance_id,
            aggregate_type,
            id,
            resource_owner,
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.instance_id, self.aggregate_type, self.id
        )
    }
}

/// Event sequence number for ordering and optimistic concurrency control.
///
/// Sequences are assigned from a per-instance counter at append time: every
/// event of an instance carries a unique, strictly increasing sequence, so
/// within any single aggregate stream sequences are strictly increasing as
/// well (with gaps where other streams interleave). This gives projections
/// a single global watermark per instance while optimistic concurrency
/// stays per aggregate:
///
/// - When appending events, the caller specifies the stream's expected
///   current sequence (the sequence of its last event)
/// - If the stream's actual last sequence differs, the append fails with a
///   conflict
/// - `Sequence::INITIAL` (0) means "no events yet"
///
/// # Examples
///
/// ```
/// use identra_core::aggregate::Sequence;
///
/// let s0 = Sequence::INITIAL;
/// assert!(s0.is_initial());
/// assert_eq!(s0.next(), Sequence::new(1));
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sequence(u64);

impl Sequence {
    /// The sequence of a stream with no events.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Sequence` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the sequence number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next sequence (current + 1).
    ///
    /// # Overflow Behavior
    ///
    /// Reaching `u64::MAX` events in a single stream is not a realistic
    /// concern; plain addition is used.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Check whether this is the initial sequence (no events appended).
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Sequence {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Sequence> for u64 {
    fn from(sequence: Sequence) -> Self {
        sequence.0
    }
}
