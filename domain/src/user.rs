//! User aggregate: event types, payloads, and lifecycle state.

use identra_core::aggregate::{
    Aggregate, AggregateId, AggregateType, InstanceId, ResourceOwner,
};
use serde::{Deserialize, Serialize};

/// Aggregate type of users.
pub const AGGREGATE_TYPE: &str = "user";

/// `user.added` — a user was created inside an organization.
pub const USER_ADDED: &str = "user.added";
/// `user.removed` — a user was removed; drives membership delete cascades.
pub const USER_REMOVED: &str = "user.removed";

/// Build the aggregate identity of a user owned by an organization.
#[must_use]
pub fn aggregate(
    instance_id: InstanceId,
    user_id: AggregateId,
    resource_owner: ResourceOwner,
) -> Aggregate {
    Aggregate::new(
        instance_id,
        AggregateType::new(AGGREGATE_TYPE),
        user_id,
        resource_owner,
    )
}

/// Lifecycle state of a user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UserState {
    /// No events observed; the user does not exist.
    #[default]
    Unspecified,
    /// The user exists.
    Active,
    /// The user was removed; terminal.
    Removed,
}

/// Payload of [`USER_ADDED`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAddedPayload {
    /// Login name of the user.
    pub user_name: String,
}

/// Payload of [`USER_REMOVED`]. The removed user is identified by the
/// aggregate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRemovedPayload {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_aggregate_is_owned_by_its_org() {
        let aggregate = aggregate(
            InstanceId::new("instance-1"),
            AggregateId::new("user-1"),
            ResourceOwner::new("org-1"),
        );
        assert_eq!(aggregate.aggregate_type.as_str(), "user");
        assert_eq!(aggregate.resource_owner.as_str(), "org-1");
    }
}
