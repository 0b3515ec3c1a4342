//! Identity-provider configuration events.
//!
//! IdP configurations are org-scoped: their events live on the org
//! aggregate, addressed by an `idpConfigId` inside the payload. The
//! configuration splits into a generic part (`org.idp.config.*` — name and
//! lifecycle) and a typed JWT part (`org.idp.jwt.config.*` — issuer and
//! keys endpoint); one write model reduces both.

use serde::{Deserialize, Serialize};

/// `org.idp.config.added` — a new IdP configuration.
pub const IDP_CONFIG_ADDED: &str = "org.idp.config.added";
/// `org.idp.config.changed` — generic attributes changed.
pub const IDP_CONFIG_CHANGED: &str = "org.idp.config.changed";
/// `org.idp.config.deactivated` — configuration disabled.
pub const IDP_CONFIG_DEACTIVATED: &str = "org.idp.config.deactivated";
/// `org.idp.config.reactivated` — configuration re-enabled.
pub const IDP_CONFIG_REACTIVATED: &str = "org.idp.config.reactivated";
/// `org.idp.config.removed` — configuration removed; terminal.
pub const IDP_CONFIG_REMOVED: &str = "org.idp.config.removed";
/// `org.idp.jwt.config.added` — JWT-specific attributes set.
pub const JWT_CONFIG_ADDED: &str = "org.idp.jwt.config.added";
/// `org.idp.jwt.config.changed` — JWT-specific attributes changed
/// (changed-field payload).
pub const JWT_CONFIG_CHANGED: &str = "org.idp.jwt.config.changed";

/// Lifecycle state of an IdP configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdpConfigState {
    /// No events observed; the configuration does not exist.
    #[default]
    Unspecified,
    /// Usable for logins.
    Active,
    /// Temporarily disabled; may be reactivated.
    Inactive,
    /// Removed; terminal.
    Removed,
}

impl IdpConfigState {
    /// Whether the configuration exists (has events and is not removed).
    #[must_use]
    pub const fn exists(self) -> bool {
        matches!(self, Self::Active | Self::Inactive)
    }

    /// Read-model representation of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Removed => "removed",
        }
    }
}

/// Payload of [`IDP_CONFIG_ADDED`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpConfigAddedPayload {
    /// Identifier of the configuration within its org.
    pub idp_config_id: String,
    /// Display name.
    pub name: String,
}

/// Payload of [`IDP_CONFIG_CHANGED`] (changed-field payload).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpConfigChangedPayload {
    /// Identifier of the configuration.
    pub idp_config_id: String,
    /// New display name, when changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Payload of the lifecycle events [`IDP_CONFIG_DEACTIVATED`],
/// [`IDP_CONFIG_REACTIVATED`], and [`IDP_CONFIG_REMOVED`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpConfigLifecyclePayload {
    /// Identifier of the configuration.
    pub idp_config_id: String,
}

/// Payload of [`JWT_CONFIG_ADDED`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtConfigAddedPayload {
    /// Identifier of the configuration.
    pub idp_config_id: String,
    /// Expected `iss` claim of incoming tokens.
    pub issuer: String,
    /// Endpoint serving the signing keys.
    pub keys_endpoint: String,
}

/// Payload of [`JWT_CONFIG_CHANGED`] (changed-field payload).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtConfigChangedPayload {
    /// Identifier of the configuration.
    pub idp_config_id: String,
    /// New issuer, when changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// New keys endpoint, when changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys_endpoint: Option<String>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)] // Test assertions use expect for clear failure messages

    use super::*;

    #[test]
    fn state_existence() {
        assert!(!IdpConfigState::Unspecified.exists());
        assert!(IdpConfigState::Active.exists());
        assert!(IdpConfigState::Inactive.exists());
        assert!(!IdpConfigState::Removed.exists());
    }

    #[test]
    fn changed_payload_omits_unchanged_fields() {
        let payload = JwtConfigChangedPayload {
            idp_config_id: "config-1".to_string(),
            issuer: Some("https://issuer.example.com".to_string()),
            keys_endpoint: None,
        };
        let json = serde_json::to_value(&payload).expect("serialization should succeed");
        assert_eq!(
            json,
            serde_json::json!({
                "idpConfigId": "config-1",
                "issuer": "https://issuer.example.com",
            })
        );
    }
}
