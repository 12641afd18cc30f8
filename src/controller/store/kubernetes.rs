//! # Kubernetes-backed Stores
//!
//! Resource writes use JSON merge patches that carry `metadata.resourceVersion`,
//! so the API server rejects them with 409 when the object moved on.
//! ProviderConfigUsages are written with server-side apply.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

use super::{ProviderConfigStore, ResourceStore, SecretSource, StoreError, UsageRef};
use crate::constants::{FIELD_MANAGER, PROVIDER_CONFIG_LABEL};
use crate::crd::{
    Managed, ProviderConfig, ProviderConfigReference, ProviderConfigUsage,
    ProviderConfigUsageSpec, TypedReference,
};

/// Map API-server errors onto the store taxonomy
pub(crate) fn map_kube_error(err: kube::Error, kind: &str, name: &str) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::not_found(kind, name),
        kube::Error::Api(ae) if ae.code == 409 => StoreError::conflict(kind, name),
        other => StoreError::Kube(other),
    }
}

fn require_resource_version<K: Managed>(obj: &K) -> Result<String, StoreError> {
    obj.resource_version().ok_or_else(|| {
        StoreError::Invalid(format!(
            "{} {} has no resourceVersion",
            K::kind(&()),
            obj.name_any()
        ))
    })
}

/// Cluster-scoped managed resources in the API server
pub struct KubeResourceStore<K> {
    api: Api<K>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: Managed> KubeResourceStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
            _kind: PhantomData,
        }
    }
}

impl<K: Managed> fmt::Debug for KubeResourceStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeResourceStore")
            .field("kind", &K::kind(&()))
            .finish()
    }
}

#[async_trait]
impl<K: Managed> ResourceStore<K> for KubeResourceStore<K> {
    async fn get(&self, name: &str) -> Result<Option<K>, StoreError> {
        self.api
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error(e, &K::kind(&()), name))
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let patch = json!({
            "metadata": {
                "resourceVersion": require_resource_version(obj)?,
                "finalizers": obj.finalizers(),
                "annotations": obj.annotations(),
            }
        });
        debug!(resource.kind = %K::kind(&()), resource.name = %name, "Patching metadata");
        self.api
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_kube_error(e, &K::kind(&()), &name))
    }

    async fn update_status(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let patch = json!({
            "metadata": { "resourceVersion": require_resource_version(obj)? },
            "status": obj.managed_status(),
        });
        debug!(resource.kind = %K::kind(&()), resource.name = %name, "Patching status");
        self.api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_kube_error(e, &K::kind(&()), &name))
    }
}

/// ProviderConfigs and ProviderConfigUsages in the API server
#[derive(Clone)]
pub struct KubeProviderConfigStore {
    configs: Api<ProviderConfig>,
    usages: Api<ProviderConfigUsage>,
}

impl KubeProviderConfigStore {
    pub fn new(client: Client) -> Self {
        Self {
            configs: Api::all(client.clone()),
            usages: Api::all(client),
        }
    }
}

impl fmt::Debug for KubeProviderConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeProviderConfigStore").finish_non_exhaustive()
    }
}

/// Build the usage object recorded for a managed resource
pub(crate) fn usage_object(usage: &UsageRef) -> ProviderConfigUsage {
    let mut obj = ProviderConfigUsage::new(
        &usage.usage_name(),
        ProviderConfigUsageSpec {
            provider_config_ref: ProviderConfigReference {
                name: usage.provider_config.clone(),
            },
            resource_ref: TypedReference {
                api_version: usage.api_version.clone(),
                kind: usage.kind.clone(),
                name: usage.name.clone(),
                uid: usage.uid.clone(),
            },
        },
    );
    obj.metadata.labels = Some(BTreeMap::from([(
        PROVIDER_CONFIG_LABEL.to_string(),
        usage.provider_config.clone(),
    )]));
    if let Some(uid) = &usage.uid {
        obj.metadata.owner_references = Some(vec![OwnerReference {
            api_version: usage.api_version.clone(),
            kind: usage.kind.clone(),
            name: usage.name.clone(),
            uid: uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]);
    }
    obj
}

#[async_trait]
impl ProviderConfigStore for KubeProviderConfigStore {
    async fn track_usage(&self, usage: &UsageRef) -> Result<(), StoreError> {
        let obj = usage_object(usage);
        let name = usage.usage_name();
        self.usages
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&obj),
            )
            .await
            .map_err(|e| map_kube_error(e, "ProviderConfigUsage", &name))?;
        Ok(())
    }

    async fn get_provider_config(&self, name: &str) -> Result<ProviderConfig, StoreError> {
        self.configs
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, "ProviderConfig", name))
    }
}

/// Secrets in the API server
#[derive(Clone)]
pub struct KubeSecretSource {
    client: Client,
}

impl KubeSecretSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl fmt::Debug for KubeSecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeSecretSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretSource for KubeSecretSource {
    async fn get_secret_key(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error(e, "Secret", name))?
            .ok_or_else(|| StoreError::not_found("Secret", &format!("{namespace}/{name}")))?;

        let from_data = secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(|value| value.0.clone());
        let from_string_data = || {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(key))
                .map(|value| value.as_bytes().to_vec())
        };
        Ok(from_data.or_else(from_string_data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_object_is_owned_and_labelled() {
        let usage = UsageRef {
            provider_config: "default".to_string(),
            api_version: "database.planetscale.crossplane.io/v1alpha1".to_string(),
            kind: "Database".to_string(),
            name: "orders".to_string(),
            uid: Some("0b6c4f1e".to_string()),
        };
        let obj = usage_object(&usage);
        assert_eq!(obj.name_any(), "0b6c4f1e");
        assert_eq!(
            obj.labels().get(PROVIDER_CONFIG_LABEL).map(String::as_str),
            Some("default")
        );
        let owners = obj.owner_references();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "Database");
        assert_eq!(owners[0].uid, "0b6c4f1e");
        assert_eq!(obj.spec.resource_ref.name, "orders");
    }

    #[test]
    fn test_usage_object_without_uid_has_no_owner() {
        let usage = UsageRef {
            provider_config: "default".to_string(),
            api_version: "branch.planetscale.crossplane.io/v1alpha1".to_string(),
            kind: "Password".to_string(),
            name: "orders-api".to_string(),
            uid: None,
        };
        let obj = usage_object(&usage);
        assert_eq!(obj.name_any(), "password-orders-api");
        assert!(obj.owner_references().is_empty());
    }
}
