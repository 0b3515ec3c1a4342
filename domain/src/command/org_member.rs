//! Org membership commands and write model.

use crate::org::{
    self, MemberAddedPayload, MemberChangedPayload, MemberRemovedPayload, MemberState, OrgState,
};
use crate::user::UserState;
use identra_core::aggregate::AggregateId;
use identra_core::error::CommandError;
use identra_core::event::{Event, EventError, EventType, NewEvent};
use identra_core::event_store::EventFilter;
use identra_core::write_model::{WriteModel, WriteModelBase};

use super::{CommandContext, Commands, ObjectDetails, OrgWriteModel, UserWriteModel};

/// Write model of one user's membership in one org.
///
/// Reduces the org stream, folding only the membership events addressed to
/// its user; membership events of other users and unrelated org events are
/// ignored (they still advance the processed sequence, which is the whole
/// org stream's concurrency token).
#[derive(Debug, Default)]
pub struct OrgMemberWriteModel {
    base: WriteModelBase,
    /// The member user.
    pub user_id: String,
    /// Current role set.
    pub roles: Vec<String>,
    /// Lifecycle state of the membership.
    pub state: MemberState,
}

impl OrgMemberWriteModel {
    /// Zero-valued write model for `(org, user)`.
    #[must_use]
    pub fn new(ctx: &CommandContext, org_id: &str, user_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(ctx.instance_id.clone(), AggregateId::new(org_id)),
            user_id: user_id.to_string(),
            ..Self::default()
        }
    }
}

impl WriteModel for OrgMemberWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> EventFilter {
        EventFilter::new(self.base.instance_id.clone())
            .aggregate_types([org::AGGREGATE_TYPE])
            .aggregate_ids([self.base.aggregate_id.as_str()])
    }

    fn reduce(&mut self, event: &Event) -> Result<(), EventError> {
        if event.event_type == org::MEMBER_ADDED {
            let payload: MemberAddedPayload = event.payload()?;
            if payload.user_id == self.user_id {
                self.roles = payload.roles;
                self.state = MemberState::Active;
            }
        } else if event.event_type == org::MEMBER_CHANGED {
            let payload: MemberChangedPayload = event.payload()?;
            if payload.user_id == self.user_id {
                self.roles = payload.roles;
            }
        } else if event.event_type == org::MEMBER_REMOVED
            || event.event_type == org::MEMBER_CASCADE_REMOVED
        {
            let payload: MemberRemovedPayload = event.payload()?;
            if payload.user_id == self.user_id {
                self.roles.clear();
                self.state = MemberState::Removed;
            }
        } else if event.event_type == org::ORG_REMOVED {
            self.state = MemberState::Removed;
        }
        Ok(())
    }
}

impl Commands {
    /// Grant a user membership in an org.
    ///
    /// # Errors
    ///
    /// - [`CommandError::InvalidArgument`] when `user_id` or `roles` is empty
    /// - [`CommandError::NotFound`] when the org or the user does not exist
    /// - [`CommandError::AlreadyExists`] when the user is already a member
    /// - [`CommandError::Conflict`], [`CommandError::Unavailable`] from the
    ///   append
    pub async fn add_org_member(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_id: &str,
        roles: Vec<String>,
    ) -> Result<ObjectDetails, CommandError> {
        if user_id.is_empty() {
            return Err(CommandError::InvalidArgument("user id must not be empty"));
        }
        if roles.is_empty() {
            return Err(CommandError::InvalidArgument(
                "at least one role must be granted",
            ));
        }

        let mut org_wm = OrgWriteModel::new(ctx, org_id);
        self.load(&mut org_wm).await?;
        if org_wm.state != OrgState::Active {
            return Err(CommandError::NotFound("org does not exist"));
        }

        let mut user_wm = UserWriteModel::new(ctx, user_id);
        self.load(&mut user_wm).await?;
        if user_wm.state != UserState::Active {
            return Err(CommandError::NotFound("user does not exist"));
        }

        let mut member = OrgMemberWriteModel::new(ctx, org_id, user_id);
        self.load(&mut member).await?;
        if member.state == MemberState::Active {
            return Err(CommandError::AlreadyExists("user is already a member"));
        }

        let aggregate = org::aggregate(ctx.instance_id.clone(), AggregateId::new(org_id));
        let event = NewEvent::from_payload(
            EventType::new(org::MEMBER_ADDED),
            &MemberAddedPayload {
                user_id: user_id.to_string(),
                roles,
                // Carried so the member projection can tombstone by the
                // user's owning org without reading any other stream.
                user_resource_owner: user_wm.base().resource_owner.as_str().to_string(),
            },
        )?;

        self.append(ctx, aggregate, member.base().processed_sequence, vec![event])
            .await
    }

    /// Replace a member's role set.
    ///
    /// No event is appended when the new role set equals the current one.
    ///
    /// # Errors
    ///
    /// - [`CommandError::InvalidArgument`] when `roles` is empty
    /// - [`CommandError::NotFound`] when the membership does not exist
    /// - [`CommandError::PreconditionFailed`] when the roles are unchanged
    /// - [`CommandError::Conflict`], [`CommandError::Unavailable`] from the
    ///   append
    pub async fn change_org_member(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_id: &str,
        roles: Vec<String>,
    ) -> Result<ObjectDetails, CommandError> {
        if roles.is_empty() {
            return Err(CommandError::InvalidArgument(
                "at least one role must be granted",
            ));
        }

        let mut member = OrgMemberWriteModel::new(ctx, org_id, user_id);
        self.load(&mut member).await?;
        if member.state != MemberState::Active {
            return Err(CommandError::NotFound("membership does not exist"));
        }
        if member.roles == roles {
            return Err(CommandError::PreconditionFailed("roles are unchanged"));
        }

        let aggregate = org::aggregate(ctx.instance_id.clone(), AggregateId::new(org_id));
        let event = NewEvent::from_payload(
            EventType::new(org::MEMBER_CHANGED),
            &MemberChangedPayload {
                user_id: user_id.to_string(),
                roles,
            },
        )?;

        self.append(ctx, aggregate, member.base().processed_sequence, vec![event])
            .await
    }

    /// End a membership.
    ///
    /// # Errors
    ///
    /// - [`CommandError::NotFound`] when the membership does not exist
    /// - [`CommandError::Conflict`], [`CommandError::Unavailable`] from the
    ///   append
    pub async fn remove_org_member(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_id: &str,
    ) -> Result<ObjectDetails, CommandError> {
        let mut member = OrgMemberWriteModel::new(ctx, org_id, user_id);
        self.load(&mut member).await?;
        if member.state != MemberState::Active {
            return Err(CommandError::NotFound("membership does not exist"));
        }

        let aggregate = org::aggregate(ctx.instance_id.clone(), AggregateId::new(org_id));
        let event = NewEvent::from_payload(
            EventType::new(org::MEMBER_REMOVED),
            &MemberRemovedPayload {
                user_id: user_id.to_string(),
            },
        )?;

        self.append(ctx, aggregate, member.base().processed_sequence, vec![event])
            .await
    }
}
