//! Organization aggregate: event types, payloads, and lifecycle states.
//!
//! The org aggregate carries the organization's own lifecycle events, its
//! membership events, and its identity-provider configuration events (see
//! [`crate::idp`]). Memberships are not aggregates of their own: a member is
//! addressed by `(org, user)` inside the org stream.

use identra_core::aggregate::{
    Aggregate, AggregateId, AggregateType, InstanceId, ResourceOwner,
};
use serde::{Deserialize, Serialize};

/// Aggregate type of organizations.
pub const AGGREGATE_TYPE: &str = "org";

/// `org.added` — an organization was created.
pub const ORG_ADDED: &str = "org.added";
/// `org.removed` — an organization was removed; drives read-model tombstone
/// cascades.
pub const ORG_REMOVED: &str = "org.removed";
/// `org.member.added` — a user became a member of the org.
pub const MEMBER_ADDED: &str = "org.member.added";
/// `org.member.changed` — a member's roles changed.
pub const MEMBER_CHANGED: &str = "org.member.changed";
/// `org.member.removed` — a membership ended.
pub const MEMBER_REMOVED: &str = "org.member.removed";
/// `org.member.cascade.removed` — a membership ended because the member
/// user was removed.
pub const MEMBER_CASCADE_REMOVED: &str = "org.member.cascade.removed";

/// Build the aggregate identity of an organization.
///
/// Organizations own themselves: the resource owner of an org aggregate is
/// its own id.
#[must_use]
pub fn aggregate(instance_id: InstanceId, org_id: AggregateId) -> Aggregate {
    let resource_owner = ResourceOwner::new(org_id.as_str());
    Aggregate::new(
        instance_id,
        AggregateType::new(AGGREGATE_TYPE),
        org_id,
        resource_owner,
    )
}

/// Lifecycle state of an organization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrgState {
    /// No events observed; the org does not exist.
    #[default]
    Unspecified,
    /// The org exists.
    Active,
    /// The org was removed; terminal.
    Removed,
}

/// Lifecycle state of a membership.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MemberState {
    /// No membership events observed for this user.
    #[default]
    Unspecified,
    /// The user is a member.
    Active,
    /// The membership was removed.
    Removed,
}

/// Payload of [`ORG_ADDED`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgAddedPayload {
    /// Display name of the organization.
    pub name: String,
}

/// Payload of [`ORG_REMOVED`]. The removed org is identified by the
/// aggregate, so the payload carries nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRemovedPayload {}

/// Payload of [`MEMBER_ADDED`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberAddedPayload {
    /// The member user.
    pub user_id: String,
    /// Granted roles.
    pub roles: Vec<String>,
    /// Resource owner of the member user, carried so projections can derive
    /// user-side cascade predicates from this event alone.
    #[serde(default)]
    pub user_resource_owner: String,
}

/// Payload of [`MEMBER_CHANGED`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberChangedPayload {
    /// The member user.
    pub user_id: String,
    /// The new full role set.
    pub roles: Vec<String>,
}

/// Payload of [`MEMBER_REMOVED`] and [`MEMBER_CASCADE_REMOVED`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRemovedPayload {
    /// The member user.
    pub user_id: String,
}
