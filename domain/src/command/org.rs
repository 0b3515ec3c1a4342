//! Organization lifecycle commands and write model.

use crate::org::{self, OrgAddedPayload, OrgRemovedPayload, OrgState};
use identra_core::aggregate::AggregateId;
use identra_core::error::CommandError;
use identra_core::event::{Event, EventError, EventType, NewEvent};
use identra_core::event_store::EventFilter;
use identra_core::write_model::{WriteModel, WriteModelBase};

use super::{CommandContext, Commands, ObjectDetails};

/// Write model of an organization's own lifecycle.
#[derive(Debug, Default)]
pub struct OrgWriteModel {
    base: WriteModelBase,
    /// Display name of the org.
    pub name: String,
    /// Lifecycle state.
    pub state: OrgState,
}

impl OrgWriteModel {
    /// Zero-valued write model for one org.
    #[must_use]
    pub fn new(ctx: &CommandContext, org_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(ctx.instance_id.clone(), AggregateId::new(org_id)),
            ..Self::default()
        }
    }
}

impl WriteModel for OrgWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> EventFilter {
        // The full org stream: the processed sequence must track the
        // stream's maximum so it can serve as the expected sequence on
        // append.
        EventFilter::new(self.base.instance_id.clone())
            .aggregate_types([org::AGGREGATE_TYPE])
            .aggregate_ids([self.base.aggregate_id.as_str()])
    }

    fn reduce(&mut self, event: &Event) -> Result<(), EventError> {
        if event.event_type == org::ORG_ADDED {
            let payload: OrgAddedPayload = event.payload()?;
            self.name = payload.name;
            self.state = OrgState::Active;
        } else if event.event_type == org::ORG_REMOVED {
            self.state = OrgState::Removed;
        }
        Ok(())
    }
}

impl Commands {
    /// Create an organization.
    ///
    /// Returns the generated org id and the details of the `org.added`
    /// event.
    ///
    /// # Errors
    ///
    /// - [`CommandError::InvalidArgument`] when `name` is empty
    /// - [`CommandError::Conflict`], [`CommandError::Unavailable`] from the
    ///   append
    pub async fn add_org(
        &self,
        ctx: &CommandContext,
        name: &str,
    ) -> Result<(AggregateId, ObjectDetails), CommandError> {
        if name.trim().is_empty() {
            return Err(CommandError::InvalidArgument("org name must not be empty"));
        }

        let org_id = AggregateId::new(self.generate_id());
        let aggregate = org::aggregate(ctx.instance_id.clone(), org_id.clone());

        let event = NewEvent::from_payload(
            EventType::new(org::ORG_ADDED),
            &OrgAddedPayload {
                name: name.to_string(),
            },
        )?;

        let details = self
            .append(
                ctx,
                aggregate,
                identra_core::aggregate::Sequence::INITIAL,
                vec![event],
            )
            .await?;
        Ok((org_id, details))
    }

    /// Remove an organization.
    ///
    /// Appends `org.removed`; read models owned by other orgs are
    /// tombstoned asynchronously by the projections subscribing to that
    /// event.
    ///
    /// # Errors
    ///
    /// - [`CommandError::NotFound`] when the org has no events or is
    ///   already removed
    /// - [`CommandError::Conflict`], [`CommandError::Unavailable`] from the
    ///   append
    pub async fn remove_org(
        &self,
        ctx: &CommandContext,
        org_id: &str,
    ) -> Result<ObjectDetails, CommandError> {
        let mut wm = OrgWriteModel::new(ctx, org_id);
        self.load(&mut wm).await?;
        if wm.state != OrgState::Active {
            return Err(CommandError::NotFound("org does not exist"));
        }

        let aggregate = org::aggregate(ctx.instance_id.clone(), AggregateId::new(org_id));
        let event = NewEvent::from_payload(
            EventType::new(org::ORG_REMOVED),
            &OrgRemovedPayload::default(),
        )?;

        self.append(ctx, aggregate, wm.base().processed_sequence, vec![event])
            .await
    }
}
