//! # ProviderConfig
//!
//! Credentials used to talk to PlanetScale, and the usage records that pin a
//! ProviderConfig while managed resources still reference it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{ProviderConfigReference, SecretKeySelector};
use super::status::ResourceStatus;

/// ProviderConfig Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: planetscale.crossplane.io/v1alpha1
/// kind: ProviderConfig
/// metadata:
///   name: default
/// spec:
///   credentials:
///     source: Secret
///     secretRef:
///       name: planetscale-token
///       namespace: crossplane-system
///       key: token
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ProviderConfig",
    group = "planetscale.crossplane.io",
    version = "v1alpha1",
    status = "ProviderConfigStatus",
    category = "crossplane",
    category = "provider",
    category = "planetscale",
    printcolumn = r#"{"name":"Source", "type":"string", "jsonPath":".spec.credentials.source"}, {"name":"Users", "type":"integer", "jsonPath":".status.users"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigSpec {
    /// Credentials required to authenticate to PlanetScale
    pub credentials: ProviderCredentials,
}

/// Where the PlanetScale service token comes from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentials {
    pub source: CredentialsSource,
    /// Secret key holding the token (source: Secret)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeySelector>,
    /// Environment variable holding the token (source: Environment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvSelector>,
    /// File holding the token (source: Filesystem)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsSelector>,
}

/// Credentials source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum CredentialsSource {
    None,
    Secret,
    Environment,
    Filesystem,
}

impl std::fmt::Display for CredentialsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "None",
            Self::Secret => "Secret",
            Self::Environment => "Environment",
            Self::Filesystem => "Filesystem",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvSelector {
    /// Environment variable name
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FsSelector {
    /// Path to the credentials file
    pub path: String,
}

/// Status of the ProviderConfig
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigStatus {
    #[serde(flatten)]
    pub resource: ResourceStatus,
    /// Number of managed resources currently using this ProviderConfig
    #[serde(default)]
    pub users: i64,
}

/// ProviderConfigUsage Custom Resource Definition
///
/// Records that one managed resource uses a ProviderConfig. Named by the UID of
/// the managed resource and owned by it, so it is garbage collected with it.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ProviderConfigUsage",
    group = "planetscale.crossplane.io",
    version = "v1alpha1",
    category = "crossplane",
    category = "provider",
    category = "planetscale",
    printcolumn = r#"{"name":"Config-Name", "type":"string", "jsonPath":".spec.providerConfigRef.name"}, {"name":"Resource-Kind", "type":"string", "jsonPath":".spec.resourceRef.kind"}, {"name":"Resource-Name", "type":"string", "jsonPath":".spec.resourceRef.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigUsageSpec {
    pub provider_config_ref: ProviderConfigReference,
    /// The managed resource using the ProviderConfig
    pub resource_ref: TypedReference,
}

/// Reference to an object of a known kind
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypedReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}
