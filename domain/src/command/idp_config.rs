//! Identity-provider configuration commands and write model.

use crate::idp::{
    self, IdpConfigAddedPayload, IdpConfigLifecyclePayload, IdpConfigState, JwtConfigAddedPayload,
    JwtConfigChangedPayload,
};
use crate::org::{self, OrgState};
use identra_core::aggregate::AggregateId;
use identra_core::error::CommandError;
use identra_core::event::{Event, EventError, EventType, NewEvent};
use identra_core::event_store::EventFilter;
use identra_core::write_model::{WriteModel, WriteModelBase};

use super::{CommandContext, Commands, ObjectDetails, OrgWriteModel};

/// Request to create a JWT-style IdP configuration.
#[derive(Clone, Debug)]
pub struct AddJwtIdpConfig {
    /// Display name of the configuration.
    pub name: String,
    /// Expected `iss` claim of incoming tokens.
    pub issuer: String,
    /// Endpoint serving the signing keys.
    pub keys_endpoint: String,
}

/// Request to update a JWT-style IdP configuration.
///
/// `None` fields are left unchanged; the appended event carries only the
/// fields that actually differ from the current state.
#[derive(Clone, Debug, Default)]
pub struct ChangeJwtIdpConfig {
    /// New issuer, if it should change.
    pub issuer: Option<String>,
    /// New keys endpoint, if it should change.
    pub keys_endpoint: Option<String>,
}

/// Write model of one IdP configuration, reducing both the generic and the
/// JWT-specific events of the org stream.
#[derive(Debug, Default)]
pub struct JwtIdpConfigWriteModel {
    base: WriteModelBase,
    /// Identifier of the configuration within its org.
    pub idp_config_id: String,
    /// Display name.
    pub name: String,
    /// Expected `iss` claim.
    pub issuer: String,
    /// Signing-keys endpoint.
    pub keys_endpoint: String,
    /// Lifecycle state.
    pub state: IdpConfigState,
}

impl JwtIdpConfigWriteModel {
    /// Zero-valued write model for `(org, config)`.
    #[must_use]
    pub fn new(ctx: &CommandContext, org_id: &str, idp_config_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(ctx.instance_id.clone(), AggregateId::new(org_id)),
            idp_config_id: idp_config_id.to_string(),
            ..Self::default()
        }
    }

    fn reduce_added(&mut self, payload: IdpConfigAddedPayload) {
        self.name = payload.name;
        self.state = IdpConfigState::Active;
    }

    fn reduce_jwt_added(&mut self, payload: JwtConfigAddedPayload) {
        self.issuer = payload.issuer;
        self.keys_endpoint = payload.keys_endpoint;
    }

    fn reduce_jwt_changed(&mut self, payload: JwtConfigChangedPayload) {
        if let Some(issuer) = payload.issuer {
            self.issuer = issuer;
        }
        if let Some(keys_endpoint) = payload.keys_endpoint {
            self.keys_endpoint = keys_endpoint;
        }
    }
}

impl WriteModel for JwtIdpConfigWriteModel {
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
        if event.event_type == idp::IDP_CONFIG_ADDED {
            let payload: IdpConfigAddedPayload = event.payload()?;
            if payload.idp_config_id == self.idp_config_id {
                self.reduce_added(payload);
            }
        } else if event.event_type == idp::JWT_CONFIG_ADDED {
            let payload: JwtConfigAddedPayload = event.payload()?;
            if payload.idp_config_id == self.idp_config_id {
                self.reduce_jwt_added(payload);
            }
        } else if event.event_type == idp::JWT_CONFIG_CHANGED {
            let payload: JwtConfigChangedPayload = event.payload()?;
            if payload.idp_config_id == self.idp_config_id {
                self.reduce_jwt_changed(payload);
            }
        } else if event.event_type == idp::IDP_CONFIG_DEACTIVATED {
            let payload: IdpConfigLifecyclePayload = event.payload()?;
            if payload.idp_config_id == self.idp_config_id {
                self.state = IdpConfigState::Inactive;
            }
        } else if event.event_type == idp::IDP_CONFIG_REACTIVATED {
            let payload: IdpConfigLifecyclePayload = event.payload()?;
            if payload.idp_config_id == self.idp_config_id {
                self.state = IdpConfigState::Active;
            }
        } else if event.event_type == idp::IDP_CONFIG_REMOVED {
            let payload: IdpConfigLifecyclePayload = event.payload()?;
            if payload.idp_config_id == self.idp_config_id {
                self.state = IdpConfigState::Removed;
            }
        }
        Ok(())
    }
}

impl Commands {
    /// Create a JWT-style IdP configuration on an org.
    ///
    /// Appends `org.idp.config.added` and `org.idp.jwt.config.added`
    /// atomically and returns the generated configuration id.
    ///
    /// # Errors
    ///
    /// - [`CommandError::InvalidArgument`] when a required field is empty
    /// - [`CommandError::NotFound`] when the org does not exist
    /// - [`CommandError::Conflict`], [`CommandError::Unavailable`] from the
    ///   append
    pub async fn add_jwt_idp_config(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        config: AddJwtIdpConfig,
    ) -> Result<(String, ObjectDetails), CommandError> {
        if config.name.trim().is_empty() {
            return Err(CommandError::InvalidArgument("name must not be empty"));
        }
        if config.issuer.trim().is_empty() {
            return Err(CommandError::InvalidArgument("issuer must not be empty"));
        }
        if config.keys_endpoint.trim().is_empty() {
            return Err(CommandError::InvalidArgument(
                "keys endpoint must not be empty",
            ));
        }

        let mut org_wm = OrgWriteModel::new(ctx, org_id);
        self.load(&mut org_wm).await?;
        if org_wm.state != OrgState::Active {
            return Err(CommandError::NotFound("org does not exist"));
        }

        let idp_config_id = self.generate_id();
        let aggregate = org::aggregate(ctx.instance_id.clone(), AggregateId::new(org_id));
        let events = vec![
            NewEvent::from_payload(
                EventType::new(idp::IDP_CONFIG_ADDED),
                &IdpConfigAddedPayload {
                    idp_config_id: idp_config_id.clone(),
                    name: config.name,
                },
            )?,
            NewEvent::from_payload(
                EventType::new(idp::JWT_CONFIG_ADDED),
                &JwtConfigAddedPayload {
                    idp_config_id: idp_config_id.clone(),
                    issuer: config.issuer,
                    keys_endpoint: config.keys_endpoint,
                },
            )?,
        ];

        let details = self
            .append(ctx, aggregate, org_wm.base().processed_sequence, events)
            .await?;
        Ok((idp_config_id, details))
    }

    /// Update a JWT-style IdP configuration.
    ///
    /// The appended event carries only the fields that differ from the
    /// current state; when nothing differs, no event is appended.
    ///
    /// # Errors
    ///
    /// - [`CommandError::NotFound`] when the configuration has no events or
    ///   is removed
    /// - [`CommandError::PreconditionFailed`] when no field changes
    /// - [`CommandError::Conflict`], [`CommandError::Unavailable`] from the
    ///   append
    pub async fn change_jwt_idp_config(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        idp_config_id: &str,
        changes: ChangeJwtIdpConfig,
    ) -> Result<ObjectDetails, CommandError> {
        let mut wm = JwtIdpConfigWriteModel::new(ctx, org_id, idp_config_id);
        self.load(&mut wm).await?;
        if !wm.state.exists() {
            return Err(CommandError::NotFound("idp configuration does not exist"));
        }

        let issuer = changes.issuer.filter(|issuer| *issuer != wm.issuer);
        let keys_endpoint = changes
            .keys_endpoint
            .filter(|endpoint| *endpoint != wm.keys_endpoint);
        if issuer.is_none() && keys_endpoint.is_none() {
            return Err(CommandError::PreconditionFailed("no changes"));
        }

        let aggregate = org::aggregate(ctx.instance_id.clone(), AggregateId::new(org_id));
        let event = NewEvent::from_payload(
            EventType::new(idp::JWT_CONFIG_CHANGED),
            &JwtConfigChangedPayload {
                idp_config_id: idp_config_id.to_string(),
                issuer,
                keys_endpoint,
            },
        )?;

        self.append(ctx, aggregate, wm.base().processed_sequence, vec![event])
            .await
    }

    /// Deactivate an IdP configuration.
    ///
    /// # Errors
    ///
    /// - [`CommandError::NotFound`] when the configuration has no events or
    ///   is removed
    /// - [`CommandError::PreconditionFailed`] unless the configuration is
    ///   active
    /// - [`CommandError::Conflict`], [`CommandError::Unavailable`] from the
    ///   append
    pub async fn deactivate_idp_config(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        idp_config_id: &str,
    ) -> Result<ObjectDetails, CommandError> {
        let mut wm = JwtIdpConfigWriteModel::new(ctx, org_id, idp_config_id);
        self.load(&mut wm).await?;
        if !wm.state.exists() {
            return Err(CommandError::NotFound("idp configuration does not exist"));
        }
        if wm.state != IdpConfigState::Active {
            return Err(CommandError::PreconditionFailed(
                "idp configuration is not active",
            ));
        }

        self.append_lifecycle(ctx, org_id, idp_config_id, idp::IDP_CONFIG_DEACTIVATED, &wm)
            .await
    }

    /// Reactivate a deactivated IdP configuration.
    ///
    /// # Errors
    ///
    /// - [`CommandError::NotFound`] when the configuration has no events or
    ///   is removed
    /// - [`CommandError::PreconditionFailed`] unless the configuration is
    ///   inactive
    /// - [`CommandError::Conflict`], [`CommandError::Unavailable`] from the
    ///   append
    pub async fn reactivate_idp_config(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        idp_config_id: &str,
    ) -> Result<ObjectDetails, CommandError> {
        let mut wm = JwtIdpConfigWriteModel::new(ctx, org_id, idp_config_id);
        self.load(&mut wm).await?;
        if !wm.state.exists() {
            return Err(CommandError::NotFound("idp configuration does not exist"));
        }
        if wm.state != IdpConfigState::Inactive {
            return Err(CommandError::PreconditionFailed(
                "idp configuration is not inactive",
            ));
        }

        self.append_lifecycle(ctx, org_id, idp_config_id, idp::IDP_CONFIG_REACTIVATED, &wm)
            .await
    }

    /// Remove an IdP configuration. Allowed from any live state; terminal.
    ///
    /// # Errors
    ///
    /// - [`CommandError::NotFound`] when the configuration has no events or
    ///   is already removed
    /// - [`CommandError::Conflict`], [`CommandError::Unavailable`] from the
    ///   append
    pub async fn remove_idp_config(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        idp_config_id: &str,
    ) -> Result<ObjectDetails, CommandError> {
        let mut wm = JwtIdpConfigWriteModel::new(ctx, org_id, idp_config_id);
        self.load(&mut wm).await?;
        if !wm.state.exists() {
            return Err(CommandError::NotFound("idp configuration does not exist"));
        }

        self.append_lifecycle(ctx, org_id, idp_config_id, idp::IDP_CONFIG_REMOVED, &wm)
            .await
    }

    async fn append_lifecycle(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        idp_config_id: &str,
        event_type: &str,
        wm: &JwtIdpConfigWriteModel,
    ) -> Result<ObjectDetails, CommandError> {
        let aggregate = org::aggregate(ctx.instance_id.clone(), AggregateId::new(org_id));
        let event = NewEvent::from_payload(
            EventType::new(event_type),
            &IdpConfigLifecyclePayload {
                idp_config_id: idp_config_id.to_string(),
            },
        )?;

        self.append(ctx, aggregate, wm.base().processed_sequence, vec![event])
            .await
    }
}
