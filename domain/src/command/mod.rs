//! Command handlers: the write side.
//!
//! A command (a) loads the relevant write model(s) from the event log,
//! (b) checks domain preconditions against them, (c) builds one or more new
//! events carrying only the changed fields, and (d) appends them with the
//! write model's last-observed sequence as the expected sequence. Successful
//! commands are the *only* way state changes.
//!
//! Failure semantics follow [`CommandError`]: invalid input fails fast with
//! nothing appended; a lost optimistic-concurrency race surfaces as
//! [`CommandError::Conflict`] and the caller retries the whole command (not
//! just the append) after the write model is recomputed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use identra_core::environment::UuidGenerator;
//! use identra_domain::command::{CommandContext, Commands};
//!
//! # async fn example(store: Arc<dyn identra_core::EventStore>) -> Result<(), Box<dyn std::error::Error>> {
//! let commands = Commands::new(store, Arc::new(UuidGenerator));
//! let ctx = CommandContext::new("instance-1", "admin-user");
//!
//! let (org_id, _) = commands.add_org(&ctx, "ACME").await?;
//! let (user_id, _) = commands.add_user(&ctx, org_id.as_str(), "alice").await?;
//! commands
//!     .add_org_member(&ctx, org_id.as_str(), user_id.as_str(), vec!["ORG_OWNER".into()])
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod idp_config;
mod org;
mod org_member;
mod user;

pub use idp_config::{AddJwtIdpConfig, ChangeJwtIdpConfig, JwtIdpConfigWriteModel};
pub use org::OrgWriteModel;
pub use org_member::OrgMemberWriteModel;
pub use user::UserWriteModel;

use chrono::{DateTime, Utc};
use identra_core::aggregate::{Aggregate, InstanceId, ResourceOwner, Sequence};
use identra_core::environment::IdGenerator;
use identra_core::error::CommandError;
use identra_core::event::{Editor, Event, NewEvent};
use identra_core::event_store::EventStore;
use identra_core::projection::WakeSignal;
use identra_core::write_model::{self, WriteModel};
use std::sync::Arc;

/// Service name recorded as the editor on every appended event.
const SERVICE_NAME: &str = "identra-commands";

/// Per-request context: which instance is addressed and who is acting.
///
/// The calling layer authenticates and authorizes the caller before a
/// command is issued; by the time a context reaches this crate it is
/// trusted.
#[derive(Clone, Debug)]
pub struct CommandContext {
    /// Instance the command is scoped to.
    pub instance_id: InstanceId,
    /// User on whose behalf the command runs (audit metadata).
    pub editor_user: String,
}

impl CommandContext {
    /// Create a command context.
    #[must_use]
    pub fn new(instance_id: impl Into<String>, editor_user: impl Into<String>) -> Self {
        Self {
            instance_id: InstanceId::new(instance_id),
            editor_user: editor_user.into(),
        }
    }

    pub(crate) fn editor(&self) -> Editor {
        Editor::new(SERVICE_NAME, self.editor_user.clone())
    }
}

/// Identity and resulting position of a changed aggregate, returned by
/// every successful command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectDetails {
    /// Sequence of the last event the command appended.
    pub sequence: Sequence,
    /// Creation date of that event.
    pub event_date: DateTime<Utc>,
    /// Owning organization of the changed aggregate.
    pub resource_owner: ResourceOwner,
}

impl ObjectDetails {
    fn from_last_event(events: &[Event]) -> Result<Self, CommandError> {
        let last = events
            .last()
            .ok_or_else(|| CommandError::Unavailable("append returned no events".to_string()))?;
        Ok(Self {
            sequence: last.sequence,
            event_date: last.creation_date,
            resource_owner: last.aggregate.resource_owner.clone(),
        })
    }
}

/// The command service: validates requests against write models and appends
/// the resulting events.
///
/// Cheap to clone-share via the contained `Arc`s; hold one per process.
#[derive(Clone)]
pub struct Commands {
    store: Arc<dyn EventStore>,
    id_generator: Arc<dyn IdGenerator>,
    wake: Option<WakeSignal>,
}

impl Commands {
    /// Create the command service.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, id_generator: Arc<dyn IdGenerator>) -> Self {
        Self {
            store,
            id_generator,
            wake: None,
        }
    }

    /// Pulse `wake` after every successful append, shortening projection
    /// latency. Projections stay correct without it (they poll).
    #[must_use]
    pub fn with_wake_signal(mut self, wake: WakeSignal) -> Self {
        self.wake = Some(wake);
        self
    }

    pub(crate) fn generate_id(&self) -> String {
        self.id_generator.generate()
    }

    /// Load a write model from the event log.
    pub(crate) async fn load<W: WriteModel>(&self, wm: &mut W) -> Result<(), CommandError> {
        write_model::load(self.store.as_ref(), wm).await?;
        Ok(())
    }

    /// Append events under the optimistic-concurrency precondition and
    /// return the details of the last stored event.
    pub(crate) async fn append(
        &self,
        ctx: &CommandContext,
        aggregate: Aggregate,
        expected_sequence: Sequence,
        events: Vec<NewEvent>,
    ) -> Result<ObjectDetails, CommandError> {
        let events = events
            .into_iter()
            .map(|event| event.with_editor(ctx.editor()))
            .collect();

        let stored = self
            .store
            .append(aggregate, expected_sequence, events)
            .await?;

        let details = ObjectDetails::from_last_event(&stored)?;
        tracing::debug!(
            aggregate = %stored[0].aggregate,
            sequence = %details.sequence,
            events = stored.len(),
            "events appended"
        );

        if let Some(wake) = &self.wake {
            wake.wake();
        }
        Ok(details)
    }
}
