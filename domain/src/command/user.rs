//! User lifecycle commands and write model.

use crate::org::{self, MemberRemovedPayload};
use crate::user::{self, UserAddedPayload, UserRemovedPayload, UserState};
use identra_core::aggregate::{AggregateId, ResourceOwner, Sequence};
use identra_core::error::CommandError;
use identra_core::event::{Event, EventError, EventType, NewEvent};
use identra_core::event_store::EventFilter;
use identra_core::write_model::{WriteModel, WriteModelBase};

use super::{CommandContext, Commands, ObjectDetails, OrgMemberWriteModel};

/// Write model of a user's lifecycle.
#[derive(Debug, Default)]
pub struct UserWriteModel {
    base: WriteModelBase,
    /// Login name.
    pub user_name: String,
    /// Lifecycle state.
    pub state: UserState,
}

impl UserWriteModel {
    /// Zero-valued write model for one user.
    #[must_use]
    pub fn new(ctx: &CommandContext, user_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(ctx.instance_id.clone(), AggregateId::new(user_id)),
            ..Self::default()
        }
    }
}

impl WriteModel for UserWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> EventFilter {
        EventFilter::new(self.base.instance_id.clone())
            .aggregate_types([user::AGGREGATE_TYPE])
            .aggregate_ids([self.base.aggregate_id.as_str()])
    }

    fn reduce(&mut self, event: &Event) -> Result<(), EventError> {
        if event.event_type == user::USER_ADDED {
            let payload: UserAddedPayload = event.payload()?;
            self.user_name = payload.user_name;
            self.state = UserState::Active;
        } else if event.event_type == user::USER_REMOVED {
            self.state = UserState::Removed;
        }
        Ok(())
    }
}

impl Commands {
    /// Create a user owned by an organization.
    ///
    /// # Errors
    ///
    /// - [`CommandError::InvalidArgument`] when `user_name` is empty
    /// - [`CommandError::NotFound`] when the owning org does not exist
    /// - [`CommandError::Conflict`], [`CommandError::Unavailable`] from the
    ///   append
    pub async fn add_user(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_name: &str,
    ) -> Result<(AggregateId, ObjectDetails), CommandError> {
        if user_name.trim().is_empty() {
            return Err(CommandError::InvalidArgument("user name must not be empty"));
        }

        let mut org_wm = super::OrgWriteModel::new(ctx, org_id);
        self.load(&mut org_wm).await?;
        if org_wm.state != org::OrgState::Active {
            return Err(CommandError::NotFound("org does not exist"));
        }

        let user_id = AggregateId::new(self.generate_id());
        let aggregate = user::aggregate(
            ctx.instance_id.clone(),
            user_id.clone(),
            ResourceOwner::new(org_id),
        );
        let event = NewEvent::from_payload(
            EventType::new(user::USER_ADDED),
            &UserAddedPayload {
                user_name: user_name.to_string(),
            },
        )?;

        let details = self
            .append(ctx, aggregate, Sequence::INITIAL, vec![event])
            .await?;
        Ok((user_id, details))
    }

    /// Remove a user, cascading the removal to the given org memberships.
    ///
    /// Appends `user.removed` to the user stream, then
    /// `org.member.cascade.removed` to each org in `member_org_ids` where
    /// the user is currently a member. Each org append is its own
    /// optimistic-concurrency unit — there is no distributed transaction;
    /// read-model consistency is carried by the projections, which also
    /// subscribe to `user.removed` itself.
    ///
    /// # Errors
    ///
    /// - [`CommandError::NotFound`] when the user has no events or is
    ///   already removed
    /// - [`CommandError::Conflict`], [`CommandError::Unavailable`] from any
    ///   append
    pub async fn remove_user(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        member_org_ids: &[&str],
    ) -> Result<ObjectDetails, CommandError> {
        let mut wm = UserWriteModel::new(ctx, user_id);
        self.load(&mut wm).await?;
        if wm.state != UserState::Active {
            return Err(CommandError::NotFound("user does not exist"));
        }

        let aggregate = user::aggregate(
            ctx.instance_id.clone(),
            AggregateId::new(user_id),
            wm.base().resource_owner.clone(),
        );
        let event = NewEvent::from_payload(
            EventType::new(user::USER_REMOVED),
            &UserRemovedPayload::default(),
        )?;
        let details = self
            .append(ctx, aggregate, wm.base().processed_sequence, vec![event])
            .await?;

        for org_id in member_org_ids {
            let mut member = OrgMemberWriteModel::new(ctx, org_id, user_id);
            self.load(&mut member).await?;
            if member.state != org::MemberState::Active {
                continue;
            }

            let org_aggregate =
                org::aggregate(ctx.instance_id.clone(), AggregateId::new(*org_id));
            let cascade = NewEvent::from_payload(
                EventType::new(org::MEMBER_CASCADE_REMOVED),
                &MemberRemovedPayload {
                    user_id: user_id.to_string(),
                },
            )?;
            self.append(
                ctx,
                org_aggregate,
                member.base().processed_sequence,
                vec![cascade],
            )
            .await?;
        }

        Ok(details)
    }
}
