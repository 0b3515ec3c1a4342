//! Org membership read-model projection.

use crate::org::{
    self, MemberAddedPayload, MemberChangedPayload, MemberRemovedPayload,
};
use crate::user;
use identra_core::event::Event;
use identra_core::projection::{Interest, Projection, ProjectionError};
use identra_core::statement::{Column, Cond, Statement, Statements, Value};

/// Table this projection owns.
pub const TABLE: &str = "projections.org_members";

/// Upsert key of the membership row.
const KEY: &[&str] = &["user_id", "org_id"];

/// Materializes one row per membership, keyed by `(user_id, org_id)`.
///
/// Besides the org's own membership events, the projection subscribes to
/// two cross-aggregate cascades:
///
/// - `user.removed` deletes every membership row of that user across all
///   orgs
/// - `org.removed` does not delete anything; it sets the `owner_removed`
///   tombstone on rows whose org vanished and `owner_removed_user` on rows
///   whose member user's owning org vanished, so downstream consumers can
///   distinguish "relationship ended" from "owning org vanished"
#[derive(Clone, Copy, Debug, Default)]
pub struct OrgMemberProjection;

impl Projection for OrgMemberProjection {
    fn name(&self) -> &'static str {
        "org_members"
    }

    fn interests(&self) -> Vec<Interest> {
        vec![
            Interest::new(org::AGGREGATE_TYPE, org::MEMBER_ADDED),
            Interest::new(org::AGGREGATE_TYPE, org::MEMBER_CHANGED),
            Interest::new(org::AGGREGATE_TYPE, org::MEMBER_REMOVED),
            Interest::new(org::AGGREGATE_TYPE, org::MEMBER_CASCADE_REMOVED),
            Interest::new(org::AGGREGATE_TYPE, org::ORG_REMOVED),
            Interest::new(user::AGGREGATE_TYPE, user::USER_REMOVED),
        ]
    }

    fn reduce(&self, event: &Event) -> Result<Statements, ProjectionError> {
        let mut statements = Statements::new();

        if event.event_type == org::MEMBER_ADDED {
            let payload: MemberAddedPayload = event.payload()?;
            statements.push(Statement::insert(
                TABLE,
                KEY,
                vec![
                    Column::new("user_id", Value::text(payload.user_id)),
                    Column::new("user_resource_owner", Value::text(payload.user_resource_owner)),
                    Column::new("owner_removed_user", false),
                    Column::new("roles", Value::text_array(payload.roles)),
                    Column::new("creation_date", event.creation_date),
                    Column::new("change_date", event.creation_date),
                    Column::new("sequence", event.sequence),
                    Column::new(
                        "resource_owner",
                        Value::text(event.aggregate.resource_owner.as_str()),
                    ),
                    Column::new(
                        "instance_id",
                        Value::text(event.aggregate.instance_id.as_str()),
                    ),
                    Column::new("owner_removed", false),
                    Column::new("org_id", Value::text(event.aggregate.id.as_str())),
                ],
            ));
        } else if event.event_type == org::MEMBER_CHANGED {
            let payload: MemberChangedPayload = event.payload()?;
            statements.push(Statement::update(
                TABLE,
                vec![
                    Column::new("roles", Value::text_array(payload.roles)),
                    Column::new("change_date", event.creation_date),
                    Column::new("sequence", event.sequence),
                ],
                vec![
                    Cond::new("user_id", Value::text(payload.user_id)),
                    Cond::new("org_id", Value::text(event.aggregate.id.as_str())),
                ],
            ));
        } else if event.event_type == org::MEMBER_REMOVED
            || event.event_type == org::MEMBER_CASCADE_REMOVED
        {
            let payload: MemberRemovedPayload = event.payload()?;
            statements.push(Statement::delete(
                TABLE,
                vec![
                    Cond::new("user_id", Value::text(payload.user_id)),
                    Cond::new("org_id", Value::text(event.aggregate.id.as_str())),
                ],
            ));
        } else if event.event_type == user::USER_REMOVED {
            // Cross-aggregate cascade: the event lives on the user
            // aggregate, so the user id is the aggregate id. One delete
            // covers the user's memberships in every org.
            statements.push(Statement::delete(
                TABLE,
                vec![Cond::new(
                    "user_id",
                    Value::text(event.aggregate.id.as_str()),
                )],
            ));
        } else if event.event_type == org::ORG_REMOVED {
            statements.push(Statement::update(
                TABLE,
                vec![
                    Column::new("change_date", event.creation_date),
                    Column::new("sequence", event.sequence),
                    Column::new("owner_removed", true),
                ],
                vec![Cond::new(
                    "resource_owner",
                    Value::text(event.aggregate.id.as_str()),
                )],
            ));
            statements.push(Statement::update(
                TABLE,
                vec![
                    Column::new("change_date", event.creation_date),
                    Column::new("sequence", event.sequence),
                    Column::new("owner_removed_user", true),
                ],
                vec![Cond::new(
                    "user_resource_owner",
                    Value::text(event.aggregate.id.as_str()),
                )],
            ));
        }

        Ok(statements)
    }
}
