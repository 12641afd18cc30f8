//! # Status Management
//!
//! Persists managed resources back to the store.
//!
//! Metadata and status are separate subresources. A metadata write returns the
//! server copy with the old status, so local status changes are carried over.
//! Status writes are skipped when nothing changed since the last persisted copy
//! to avoid triggering needless watch events.

use tracing::debug;

use crate::controller::context::OpContext;
use crate::controller::store::{ResourceStore, StoreError};
use crate::crd::Managed;

/// Write finalizers and annotations, keeping local status changes
///
/// Returns the persisted copy, which becomes the new baseline.
pub async fn persist_metadata<K: Managed>(
    ctx: &OpContext,
    store: &dyn ResourceStore<K>,
    mg: &mut K,
) -> Result<K, StoreError> {
    let status = mg.managed_status().cloned();
    let stored = ctx.run(store.update(mg)).await?;
    *mg = stored.clone();
    if let Some(status) = status {
        *mg.managed_status_mut() = status;
    }
    Ok(stored)
}

/// Write status if it differs from `baseline`
///
/// Returns true if a write was made.
pub async fn persist_status<K: Managed>(
    ctx: &OpContext,
    store: &dyn ResourceStore<K>,
    mg: &mut K,
    baseline: &K,
) -> Result<bool, StoreError> {
    if mg.managed_status() == baseline.managed_status() {
        debug!("Skipping status update - status unchanged");
        return Ok(false);
    }
    *mg = ctx.run(store.update_status(mg)).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::store::memory::MemoryResourceStore;
    use crate::crd::{
        Condition, ConditionType, Database, DatabaseParameters, DatabaseSpec, ResourceSpec,
    };
    use kube::ResourceExt;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn database() -> Database {
        Database::new(
            "orders",
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

    fn ctx() -> OpContext {
        OpContext::new(Duration::from_secs(5), &CancellationToken::new())
    }

    #[tokio::test]
    async fn test_metadata_write_keeps_local_status() {
        let store = MemoryResourceStore::new();
        let mut db = store.apply(database());
        db.managed_status_mut()
            .resource
            .set_condition(Condition::creating());
        db.add_managed_finalizer();

        let stored = persist_metadata(&ctx(), &store, &mut db).await.unwrap();

        assert!(stored.managed_status().is_none());
        assert!(db.has_managed_finalizer());
        assert!(db
            .managed_status()
            .and_then(|s| s.resource.condition(ConditionType::Ready))
            .is_some());
        assert_eq!(db.resource_version(), stored.resource_version());
    }

    #[tokio::test]
    async fn test_unchanged_status_is_not_written() {
        let store = MemoryResourceStore::new();
        let mut db = store.apply(database());
        let baseline = db.clone();

        assert!(!persist_status(&ctx(), &store, &mut db, &baseline)
            .await
            .unwrap());
        assert_eq!(store.status_writes(), 0);

        db.managed_status_mut()
            .resource
            .set_condition(Condition::available());
        assert!(persist_status(&ctx(), &store, &mut db, &baseline)
            .await
            .unwrap());
        assert_eq!(store.status_writes(), 1);
    }
}
