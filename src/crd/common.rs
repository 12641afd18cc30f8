//! # Common Resource Spec
//!
//! Fields every managed resource carries next to its provider-specific parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_PROVIDER_CONFIG;

/// Spec fields shared by every managed resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// ProviderConfig holding the credentials used to talk to PlanetScale
    #[serde(default)]
    pub provider_config_ref: ProviderConfigReference,
    /// Secret that receives the connection details of the external resource
    /// Left unset, connection details are discarded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secret_to_ref: Option<SecretReference>,
    /// What happens to the external resource when this resource is deleted
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

/// Reference to a cluster-scoped ProviderConfig
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigReference {
    /// ProviderConfig name
    pub name: String,
}

impl Default for ProviderConfigReference {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROVIDER_CONFIG.to_string(),
        }
    }
}

/// Reference to a namespaced Secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Secret name
    pub name: String,
    /// Secret namespace
    pub namespace: String,
}

/// Secret key selector
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    /// Secret name
    pub name: String,
    /// Secret namespace
    pub namespace: String,
    /// Key within the Secret data
    pub key: String,
}

/// Deletion policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum DeletionPolicy {
    /// Delete the external resource together with the managed resource (DEFAULT)
    #[default]
    Delete,
    /// Leave the external resource in place
    Orphan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_spec_defaults() {
        let spec: ResourceSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(spec.provider_config_ref.name, "default");
        assert_eq!(spec.deletion_policy, DeletionPolicy::Delete);
        assert!(spec.write_connection_secret_to_ref.is_none());
    }

    #[test]
    fn test_resource_spec_orphan_policy() {
        let spec: ResourceSpec = serde_json::from_value(serde_json::json!({
            "providerConfigRef": { "name": "team-a" },
            "deletionPolicy": "Orphan",
            "writeConnectionSecretToRef": { "name": "db-conn", "namespace": "apps" }
        }))
        .unwrap();
        assert_eq!(spec.provider_config_ref.name, "team-a");
        assert_eq!(spec.deletion_policy, DeletionPolicy::Orphan);
        assert_eq!(
            spec.write_connection_secret_to_ref,
            Some(SecretReference {
                name: "db-conn".to_string(),
                namespace: "apps".to_string()
            })
        );
    }
}
