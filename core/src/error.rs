//! Command error taxonomy.
//!
//! Every command handler returns one of these kinds; callers map them to
//! their transport's status codes. Command failures are synchronous and
//! immediate — no retry is attempted internally, except that callers are
//! expected to retry [`CommandError::Conflict`] by recomputing the write
//! model and re-running the whole command.

use crate::aggregate::{Aggregate, Sequence};
use crate::event::EventError;
use crate::event_store::EventStoreError;
use crate::write_model::WriteModelError;
use thiserror::Error;

/// The failure kinds a command can surface.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Malformed or missing command input; nothing was appended.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The referenced aggregate has no events or is in a terminal removed
    /// state.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// A uniqueness invariant the command enforces would be violated.
    #[error("already exists: {0}")]
    AlreadyExists(&'static str),

    /// A non-uniqueness business rule blocks the transition (e.g. editing a
    /// removed configuration).
    #[error("precondition failed: {0}")]
    PreconditionFailed(&'static str),

    /// Optimistic concurrency lost on append. Retry the whole command after
    /// recomputing the write model, not just the append.
    #[error("concurrency conflict on {aggregate}: expected sequence {expected}, found {actual}")]
    Conflict {
        /// The aggregate stream where the conflict occurred.
        aggregate: Aggregate,
        /// The sequence the command expected.
        expected: Sequence,
        /// The stream's actual sequence.
        actual: Sequence,
    },

    /// Storage I/O failure.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<EventStoreError> for CommandError {
    fn from(error: EventStoreError) -> Self {
        match error {
            EventStoreError::Conflict {
                aggregate,
                expected,
                actual,
            } => Self::Conflict {
                aggregate,
                expected,
                actual,
            },
            EventStoreError::Unavailable(message) | EventStoreError::Serialization(message) => {
                Self::Unavailable(message)
            }
        }
    }
}

impl From<WriteModelError> for CommandError {
    fn from(error: WriteModelError) -> Self {
        match error {
            WriteModelError::Store(store) => store.into(),
            WriteModelError::Event(event) => Self::Unavailable(event.to_string()),
        }
    }
}

impl From<EventError> for CommandError {
    /// Payload encoding failures are storage-boundary problems, not caller
    /// mistakes.
    fn from(error: EventError) -> Self {
        Self::Unavailable(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregateId, AggregateType, InstanceId, ResourceOwner};

    #[test]
    fn conflict_converts_from_store_error() {
        let aggregate = Aggregate::new(
            InstanceId::new("instance-1"),
            AggregateType::new("org"),
            AggregateId::new("org-1"),
            ResourceOwner::new("org-1"),
        );
        let store_error = EventStoreError::Conflict {
            aggregate,
            expected: Sequence::new(10),
            actual: Sequence::new(11),
        };

        let command_error: CommandError = store_error.into();
        assert!(matches!(command_error, CommandError::Conflict { .. }));
    }

    #[test]
    fn unavailable_converts_from_store_error() {
        let command_error: CommandError =
            EventStoreError::Unavailable("connection refused".to_string()).into();
        assert!(matches!(command_error, CommandError::Unavailable(_)));
    }
}
