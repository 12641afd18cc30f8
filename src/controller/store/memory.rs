//! # In-Memory Stores
//!
//! Behave like the API server where the engine depends on it: writes bump
//! `resourceVersion`, stale writes conflict, and an object that is deleting
//! disappears once its last finalizer is removed.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kube::ResourceExt;

use super::{ProviderConfigStore, ResourceStore, SecretSource, StoreError, UsageRef};
use super::kubernetes::usage_object;
use crate::crd::{Managed, ProviderConfig, ProviderConfigUsage};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Objects<K> {
    items: BTreeMap<String, K>,
    next_version: u64,
    writes: usize,
    status_writes: usize,
    conflict_next_write: bool,
    reject_next_write: bool,
}

impl<K> Default for Objects<K> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            next_version: 1,
            writes: 0,
            status_writes: 0,
            conflict_next_write: false,
            reject_next_write: false,
        }
    }
}

/// In-memory managed resources
#[derive(Debug)]
pub struct MemoryResourceStore<K> {
    objects: Mutex<Objects<K>>,
}

impl<K> Default for MemoryResourceStore<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(Objects::default()),
        }
    }
}

impl<K: Managed> MemoryResourceStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace an object as a client would, assigning a UID and version
    pub fn apply(&self, mut obj: K) -> K {
        let mut objects = lock(&self.objects);
        let name = obj.name_any();
        let version = objects.next_version;
        objects.next_version += 1;
        obj.meta_mut().resource_version = Some(version.to_string());
        if obj.meta().uid.is_none() {
            obj.meta_mut().uid = Some(format!("uid-{}-{name}", K::kind(&()).to_lowercase()));
        }
        objects.items.insert(name, obj.clone());
        obj
    }

    /// Mark an object as deleted; it is removed once it holds no finalizers
    pub fn request_delete(&self, name: &str) {
        let mut objects = lock(&self.objects);
        let version = objects.next_version;
        objects.next_version += 1;
        let remove = match objects.items.get_mut(name) {
            Some(obj) => {
                if obj.meta().deletion_timestamp.is_none() {
                    obj.meta_mut().deletion_timestamp = deletion_time();
                }
                obj.meta_mut().resource_version = Some(version.to_string());
                obj.finalizers().is_empty()
            }
            None => false,
        };
        if remove {
            objects.items.remove(name);
        }
    }

    pub fn snapshot(&self, name: &str) -> Option<K> {
        lock(&self.objects).items.get(name).cloned()
    }

    /// Metadata writes accepted so far
    pub fn writes(&self) -> usize {
        lock(&self.objects).writes
    }

    /// Status writes accepted so far
    pub fn status_writes(&self) -> usize {
        lock(&self.objects).status_writes
    }

    /// Reject the next write with a conflict, as if another client wrote first
    pub fn conflict_next_write(&self) {
        lock(&self.objects).conflict_next_write = true;
    }

    /// Fail the next write outright, as an admission webhook or outage would
    pub fn reject_next_write(&self) {
        lock(&self.objects).reject_next_write = true;
    }

    fn write(&self, obj: &K, status_only: bool) -> Result<K, StoreError> {
        let kind = K::kind(&());
        let name = obj.name_any();
        let mut objects = lock(&self.objects);
        if std::mem::take(&mut objects.conflict_next_write) {
            return Err(StoreError::conflict(&kind, &name));
        }
        if std::mem::take(&mut objects.reject_next_write) {
            return Err(StoreError::Invalid(format!("write to {kind} {name} rejected")));
        }
        let version = objects.next_version;
        let stored = objects
            .items
            .get_mut(&name)
            .ok_or_else(|| StoreError::not_found(&kind, &name))?;
        if stored.resource_version() != obj.resource_version() {
            return Err(StoreError::conflict(&kind, &name));
        }

        if status_only {
            *stored.managed_status_mut() = obj.managed_status().cloned().unwrap_or_default();
        } else {
            stored.meta_mut().finalizers = obj.meta().finalizers.clone();
            stored.meta_mut().annotations = obj.meta().annotations.clone();
        }
        stored.meta_mut().resource_version = Some(version.to_string());
        let updated = stored.clone();
        let gone = updated.meta().deletion_timestamp.is_some() && updated.finalizers().is_empty();

        objects.next_version += 1;
        if status_only {
            objects.status_writes += 1;
        } else {
            objects.writes += 1;
        }
        if gone {
            objects.items.remove(&name);
        }
        Ok(updated)
    }
}

/// Only the presence of the deletion timestamp is ever inspected
fn deletion_time() -> Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time> {
    let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    serde_json::from_value(serde_json::Value::String(now)).ok()
}

#[async_trait]
impl<K: Managed> ResourceStore<K> for MemoryResourceStore<K> {
    async fn get(&self, name: &str) -> Result<Option<K>, StoreError> {
        Ok(self.snapshot(name))
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        self.write(obj, false)
    }

    async fn update_status(&self, obj: &K) -> Result<K, StoreError> {
        self.write(obj, true)
    }
}

/// In-memory ProviderConfigs and usages
#[derive(Debug, Default)]
pub struct MemoryProviderConfigStore {
    configs: Mutex<BTreeMap<String, ProviderConfig>>,
    usages: Mutex<BTreeMap<String, ProviderConfigUsage>>,
    fail_track_usage: Mutex<bool>,
}

impl MemoryProviderConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, config: ProviderConfig) {
        lock(&self.configs).insert(config.name_any(), config);
    }

    pub fn remove(&self, name: &str) {
        lock(&self.configs).remove(name);
    }

    pub fn usages(&self) -> Vec<ProviderConfigUsage> {
        lock(&self.usages).values().cloned().collect()
    }

    /// Make every usage write fail until reset
    pub fn set_fail_track_usage(&self, fail: bool) {
        *lock(&self.fail_track_usage) = fail;
    }
}

#[async_trait]
impl ProviderConfigStore for MemoryProviderConfigStore {
    async fn track_usage(&self, usage: &UsageRef) -> Result<(), StoreError> {
        if *lock(&self.fail_track_usage) {
            return Err(StoreError::Invalid("usage writes rejected".to_string()));
        }
        lock(&self.usages).insert(usage.usage_name(), usage_object(usage));
        Ok(())
    }

    async fn get_provider_config(&self, name: &str) -> Result<ProviderConfig, StoreError> {
        lock(&self.configs)
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("ProviderConfig", name))
    }
}

/// In-memory Secret data keyed by namespace and name
#[derive(Debug, Default)]
pub struct MemorySecretSource {
    secrets: Mutex<HashMap<(String, String), BTreeMap<String, Vec<u8>>>>,
}

impl MemorySecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, namespace: &str, name: &str, key: &str, value: &[u8]) {
        lock(&self.secrets)
            .entry((namespace.to_string(), name.to_string()))
            .or_default()
            .insert(key.to_string(), value.to_vec());
    }
}

#[async_trait]
impl SecretSource for MemorySecretSource {
    async fn get_secret_key(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let secrets = lock(&self.secrets);
        let data = secrets
            .get(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| StoreError::not_found("Secret", &format!("{namespace}/{name}")))?;
        Ok(data.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Database, DatabaseParameters, DatabaseSpec, ResourceSpec};

    fn database(name: &str) -> Database {
        Database::new(
            name,
            DatabaseSpec {
                resource: ResourceSpec::default(),
                for_provider: DatabaseParameters {
                    organization: "acme".to_string(),
                    region: None,
                    notes: None,
                },
            },
        )
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let store = MemoryResourceStore::new();
        let stale = store.apply(database("orders"));
        let mut fresh = stale.clone();
        fresh.add_managed_finalizer();
        store.update(&fresh).await.unwrap();

        let mut late = stale;
        late.set_external_name("other");
        let err = store.update(&late).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_removing_last_finalizer_deletes_object() {
        let store = MemoryResourceStore::new();
        let mut db = database("orders");
        db.add_managed_finalizer();
        store.apply(db);
        store.request_delete("orders");

        let mut current = store.get("orders").await.unwrap().unwrap();
        assert!(current.is_deleting());
        current.remove_managed_finalizer();
        store.update(&current).await.unwrap();
        assert!(store.get("orders").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_write_leaves_metadata_alone() {
        let store = MemoryResourceStore::new();
        let mut db = store.apply(database("orders"));
        db.set_external_name("not-persisted");
        db.managed_status_mut()
            .resource
            .set_condition(crate::crd::Condition::available());
        let written = store.update_status(&db).await.unwrap();
        assert_eq!(written.external_name(), None);
        assert_eq!(store.status_writes(), 1);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_secret_source_missing_key() {
        let secrets = MemorySecretSource::new();
        secrets.insert("crossplane-system", "ps", "token", b"abc");
        assert_eq!(
            secrets
                .get_secret_key("crossplane-system", "ps", "token")
                .await
                .unwrap(),
            Some(b"abc".to_vec())
        );
        assert_eq!(
            secrets
                .get_secret_key("crossplane-system", "ps", "other")
                .await
                .unwrap(),
            None
        );
        assert!(secrets
            .get_secret_key("crossplane-system", "missing", "token")
            .await
            .unwrap_err()
            .is_not_found());
    }
}
