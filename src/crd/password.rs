//! # Password
//!
//! A credential for one branch of a PlanetScale database.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::ResourceSpec;
use super::managed::Managed;
use super::status::ManagedStatus;

/// Password Custom Resource Definition
///
/// The password's display name is the resource name. PlanetScale assigns the
/// password ID, which becomes the external name once the password is created.
///
/// # Example
///
/// ```yaml
/// apiVersion: branch.planetscale.crossplane.io/v1alpha1
/// kind: Password
/// metadata:
///   name: orders-api
/// spec:
///   forProvider:
///     organization: acme
///     database: orders
///     branch: main
///   writeConnectionSecretToRef:
///     name: orders-db
///     namespace: orders
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Password",
    group = "branch.planetscale.crossplane.io",
    version = "v1alpha1",
    status = "PasswordStatus",
    shortname = "pspw",
    category = "crossplane",
    category = "managed",
    category = "planetscale",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}, {"name":"External-Name", "type":"string", "jsonPath":".metadata.annotations.crossplane\\.io/external-name"}, {"name":"Branch", "type":"string", "jsonPath":".spec.forProvider.branch"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSpec {
    #[serde(flatten)]
    pub resource: ResourceSpec,
    /// Desired password parameters
    pub for_provider: PasswordParameters,
}

/// Configurable fields of a branch password
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordParameters {
    /// Organization that owns the database
    pub organization: String,
    /// Database name
    pub database: String,
    /// Branch name
    pub branch: String,
    /// Password role (reader, writer, readwriter, admin); PlanetScale default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Observable fields of a branch password
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordObservation {
    /// Password ID assigned by PlanetScale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Host to connect to with this password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_host_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Status of the Password resource
pub type PasswordStatus = ManagedStatus<PasswordObservation>;

impl Managed for Password {
    type Observation = PasswordObservation;

    const CONNECTION_KEYS: &'static [&'static str] = &["host", "username", "password", "database"];

    fn resource_spec(&self) -> &ResourceSpec {
        &self.spec.resource
    }

    fn managed_status(&self) -> Option<&PasswordStatus> {
        self.status.as_ref()
    }

    fn managed_status_mut(&mut self) -> &mut PasswordStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_password_crd_group() {
        let crd = Password::crd();
        assert_eq!(crd.spec.group, "branch.planetscale.crossplane.io");
        assert_eq!(crd.spec.scope, "Cluster");
    }

    #[test]
    fn test_password_status_at_provider() {
        let status: PasswordStatus = serde_json::from_value(serde_json::json!({
            "conditions": [],
            "atProvider": { "id": "pw-1", "displayName": "orders-api", "role": "writer" }
        }))
        .unwrap();
        let observed = status.at_provider.unwrap();
        assert_eq!(observed.id.as_deref(), Some("pw-1"));
        assert_eq!(observed.display_name.as_deref(), Some("orders-api"));
    }
}
