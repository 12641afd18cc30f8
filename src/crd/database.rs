//! # Database
//!
//! A PlanetScale database owned by an organization.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::ResourceSpec;
use super::managed::Managed;
use super::status::ManagedStatus;

/// Database Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: database.planetscale.crossplane.io/v1alpha1
/// kind: Database
/// metadata:
///   name: orders
/// spec:
///   providerConfigRef:
///     name: default
///   forProvider:
///     organization: acme
///     region: eu-west
///     notes: order service primary database
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Database",
    group = "database.planetscale.crossplane.io",
    version = "v1alpha1",
    status = "DatabaseStatus",
    shortname = "psdb",
    category = "crossplane",
    category = "managed",
    category = "planetscale",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}, {"name":"External-Name", "type":"string", "jsonPath":".metadata.annotations.crossplane\\.io/external-name"}, {"name":"State", "type":"string", "jsonPath":".status.atProvider.state"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    #[serde(flatten)]
    pub resource: ResourceSpec,
    /// Desired database parameters
    pub for_provider: DatabaseParameters,
}

/// Configurable fields of a PlanetScale database
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseParameters {
    /// Organization that owns the database
    pub organization: String,
    /// Region slug (e.g. "us-east", "eu-west"); organization default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Free-form notes attached to the database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Observable fields of a PlanetScale database
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseObservation {
    /// Database state as reported by PlanetScale (pending, ready, sleeping, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Region slug the database runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Dashboard URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Status of the Database resource
pub type DatabaseStatus = ManagedStatus<DatabaseObservation>;

impl Managed for Database {
    type Observation = DatabaseObservation;

    fn resource_spec(&self) -> &ResourceSpec {
        &self.spec.resource
    }

    fn managed_status(&self) -> Option<&DatabaseStatus> {
        self.status.as_ref()
    }

    fn managed_status_mut(&mut self) -> &mut DatabaseStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_database_crd_is_cluster_scoped() {
        let crd = Database::crd();
        assert_eq!(crd.spec.group, "database.planetscale.crossplane.io");
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.names.kind, "Database");
    }

    #[test]
    fn test_database_spec_flattens_resource_spec() {
        let spec: DatabaseSpec = serde_json::from_value(serde_json::json!({
            "providerConfigRef": { "name": "team-a" },
            "forProvider": { "organization": "acme", "region": "eu-west" }
        }))
        .unwrap();
        assert_eq!(spec.resource.provider_config_ref.name, "team-a");
        assert_eq!(spec.for_provider.region.as_deref(), Some("eu-west"));
        assert_eq!(spec.for_provider.notes, None);
    }
}
