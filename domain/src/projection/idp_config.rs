//! Identity-provider configuration read-model projection.

use crate::idp::{
    self, IdpConfigAddedPayload, IdpConfigChangedPayload, IdpConfigLifecyclePayload,
    IdpConfigState, JwtConfigAddedPayload, JwtConfigChangedPayload,
};
use crate::org;
use identra_core::event::Event;
use identra_core::projection::{Interest, Projection, ProjectionError};
use identra_core::statement::{Column, Cond, Statement, Statements, Value};

/// Table this projection owns.
pub const TABLE: &str = "projections.idp_configs";

/// Upsert key of the configuration row.
const KEY: &[&str] = &["idp_config_id"];

/// Materializes one row per IdP configuration, keyed by `idp_config_id`.
///
/// Generic events maintain the name and lifecycle state, the JWT events
/// maintain issuer and keys endpoint, and `org.removed` tombstones every
/// configuration of the vanished org instead of deleting it.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdpConfigProjection;

impl IdpConfigProjection {
    fn update_by_id(
        event: &Event,
        idp_config_id: String,
        mut columns: Vec<Column>,
    ) -> Statement {
        columns.push(Column::new("change_date", event.creation_date));
        columns.push(Column::new("sequence", event.sequence));
        Statement::update(
            TABLE,
            columns,
            vec![Cond::new("idp_config_id", Value::text(idp_config_id))],
        )
    }
}

impl Projection for IdpConfigProjection {
    fn name(&self) -> &'static str {
        "idp_configs"
    }

    fn interests(&self) -> Vec<Interest> {
        vec![
            Interest::new(org::AGGREGATE_TYPE, idp::IDP_CONFIG_ADDED),
            Interest::new(org::AGGREGATE_TYPE, idp::IDP_CONFIG_CHANGED),
            Interest::new(org::AGGREGATE_TYPE, idp::IDP_CONFIG_DEACTIVATED),
            Interest::new(org::AGGREGATE_TYPE, idp::IDP_CONFIG_REACTIVATED),
            Interest::new(org::AGGREGATE_TYPE, idp::IDP_CONFIG_REMOVED),
            Interest::new(org::AGGREGATE_TYPE, idp::JWT_CONFIG_ADDED),
            Interest::new(org::AGGREGATE_TYPE, idp::JWT_CONFIG_CHANGED),
            Interest::new(org::AGGREGATE_TYPE, org::ORG_REMOVED),
        ]
    }

    fn reduce(&self, event: &Event) -> Result<Statements, ProjectionError> {
        let mut statements = Statements::new();

        if event.event_type == idp::IDP_CONFIG_ADDED {
            let payload: IdpConfigAddedPayload = event.payload()?;
            statements.push(Statement::insert(
                TABLE,
                KEY,
                vec![
                    Column::new("idp_config_id", Value::text(payload.idp_config_id)),
                    Column::new("name", Value::text(payload.name)),
                    Column::new("state", Value::text(IdpConfigState::Active.as_str())),
                    Column::new("issuer", Value::Null),
                    Column::new("keys_endpoint", Value::Null),
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
                ],
            ));
        } else if event.event_type == idp::IDP_CONFIG_CHANGED {
            let payload: IdpConfigChangedPayload = event.payload()?;
            let mut columns = Vec::new();
            if let Some(name) = payload.name {
                columns.push(Column::new("name", Value::text(name)));
            }
            statements.push(Self::update_by_id(event, payload.idp_config_id, columns));
        } else if event.event_type == idp::IDP_CONFIG_DEACTIVATED {
            let payload: IdpConfigLifecyclePayload = event.payload()?;
            statements.push(Self::update_by_id(
                event,
                payload.idp_config_id,
                vec![Column::new(
                    "state",
                    Value::text(IdpConfigState::Inactive.as_str()),
                )],
            ));
        } else if event.event_type == idp::IDP_CONFIG_REACTIVATED {
            let payload: IdpConfigLifecyclePayload = event.payload()?;
            statements.push(Self::update_by_id(
                event,
                payload.idp_config_id,
                vec![Column::new(
                    "state",
                    Value::text(IdpConfigState::Active.as_str()),
                )],
            ));
        } else if event.event_type == idp::IDP_CONFIG_REMOVED {
            let payload: IdpConfigLifecyclePayload = event.payload()?;
            statements.push(Statement::delete(
                TABLE,
                vec![Cond::new(
                    "idp_config_id",
                    Value::text(payload.idp_config_id),
                )],
            ));
        } else if event.event_type == idp::JWT_CONFIG_ADDED {
            let payload: JwtConfigAddedPayload = event.payload()?;
            statements.push(Self::update_by_id(
                event,
                payload.idp_config_id,
                vec![
                    Column::new("issuer", Value::text(payload.issuer)),
                    Column::new("keys_endpoint", Value::text(payload.keys_endpoint)),
                ],
            ));
        } else if event.event_type == idp::JWT_CONFIG_CHANGED {
            let payload: JwtConfigChangedPayload = event.payload()?;
            let mut columns = Vec::new();
            if let Some(issuer) = payload.issuer {
                columns.push(Column::new("issuer", Value::text(issuer)));
            }
            if let Some(keys_endpoint) = payload.keys_endpoint {
                columns.push(Column::new("keys_endpoint", Value::text(keys_endpoint)));
            }
            statements.push(Self::update_by_id(event, payload.idp_config_id, columns));
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
        }

        Ok(statements)
    }
}
