//! # Managed Resources
//!
//! The `Managed` trait is the seam between the reconciliation engine and the
//! concrete resource kinds. Every kind carries the common resource spec, a
//! `ManagedStatus` with its own observation type, the external-name annotation
//! and the engine finalizer.

use std::collections::BTreeMap;
use std::fmt::Debug;

use kube::core::ClusterResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::common::{DeletionPolicy, ResourceSpec};
use super::status::ManagedStatus;
use crate::constants::{EXTERNAL_NAME_ANNOTATION, MANAGED_FINALIZER};

/// A cluster-scoped custom resource whose external counterpart is reconciled by the engine
pub trait Managed:
    Resource<DynamicType = (), Scope = ClusterResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Observable external state written to `status.atProvider`
    type Observation: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Keys the connection Secret must hold before the resource counts as ready
    const CONNECTION_KEYS: &'static [&'static str] = &[];

    fn resource_spec(&self) -> &ResourceSpec;

    fn managed_status(&self) -> Option<&ManagedStatus<Self::Observation>>;

    /// Mutable status, initialized to the default when absent
    fn managed_status_mut(&mut self) -> &mut ManagedStatus<Self::Observation>;

    fn deletion_policy(&self) -> DeletionPolicy {
        self.resource_spec().deletion_policy
    }

    fn provider_config_name(&self) -> &str {
        &self.resource_spec().provider_config_ref.name
    }

    /// Value of the `crossplane.io/external-name` annotation, ignoring empty values
    fn external_name(&self) -> Option<&str> {
        self.annotations()
            .get(EXTERNAL_NAME_ANNOTATION)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    fn set_external_name(&mut self, name: &str) {
        self.meta_mut()
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(EXTERNAL_NAME_ANNOTATION.to_string(), name.to_string());
    }

    fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    fn has_managed_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == MANAGED_FINALIZER)
    }

    /// Add the engine finalizer. Returns true if it was missing.
    fn add_managed_finalizer(&mut self) -> bool {
        if self.has_managed_finalizer() {
            return false;
        }
        self.finalizers_mut().push(MANAGED_FINALIZER.to_string());
        true
    }

    /// Remove the engine finalizer. Returns true if it was present.
    fn remove_managed_finalizer(&mut self) -> bool {
        let finalizers = self.finalizers_mut();
        let before = finalizers.len();
        finalizers.retain(|f| f != MANAGED_FINALIZER);
        finalizers.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Database, DatabaseParameters, DatabaseSpec};

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

    #[test]
    fn test_external_name_round_trip() {
        let mut db = database("orders");
        assert_eq!(db.external_name(), None);
        db.set_external_name("orders-prod");
        assert_eq!(db.external_name(), Some("orders-prod"));
    }

    #[test]
    fn test_empty_external_name_is_unset() {
        let mut db = database("orders");
        db.set_external_name("");
        assert_eq!(db.external_name(), None);
    }

    #[test]
    fn test_finalizer_add_remove_is_idempotent() {
        let mut db = database("orders");
        assert!(db.add_managed_finalizer());
        assert!(!db.add_managed_finalizer());
        assert_eq!(db.finalizers().len(), 1);
        assert!(db.remove_managed_finalizer());
        assert!(!db.remove_managed_finalizer());
        assert!(!db.has_managed_finalizer());
    }

    #[test]
    fn test_status_mut_initializes_status() {
        let mut db = database("orders");
        assert!(db.managed_status().is_none());
        db.managed_status_mut().at_provider = Some(crate::crd::DatabaseObservation {
            state: Some("ready".to_string()),
            ..Default::default()
        });
        assert!(db.managed_status().is_some());
    }
}
