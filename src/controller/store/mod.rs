//! # Stores
//!
//! Access to Kubernetes objects the engine reads and writes. Every write is
//! optimistic: it carries the `resourceVersion` that was read, and a stale
//! version is rejected with [`StoreError::Conflict`].
//!
//! `kubernetes` holds the API-server backed implementations, `memory` the
//! in-process ones used by tests.

pub mod kubernetes;
pub mod memory;

use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;

use crate::controller::context::Interrupted;
use crate::crd::{Managed, ProviderConfig};

/// Errors from a store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("conflict writing {kind} {name}: the object has been modified")]
    Conflict { kind: String, name: String },

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl StoreError {
    pub fn not_found(kind: &str, name: &str) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub fn conflict(kind: &str, name: &str) -> Self {
        Self::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Desired-state store for one managed resource kind
#[async_trait]
pub trait ResourceStore<K: Managed>: Send + Sync + Debug {
    /// Fetch the latest version; `None` if the object does not exist
    async fn get(&self, name: &str) -> Result<Option<K>, StoreError>;

    /// Write finalizers and annotations
    async fn update(&self, obj: &K) -> Result<K, StoreError>;

    /// Write the status subresource
    async fn update_status(&self, obj: &K) -> Result<K, StoreError>;
}

/// Identity of a managed resource recorded in a ProviderConfigUsage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRef {
    pub provider_config: String,
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: Option<String>,
}

impl UsageRef {
    pub fn for_resource<K: Managed>(mg: &K) -> Self {
        Self {
            provider_config: mg.provider_config_name().to_string(),
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            name: mg.meta().name.clone().unwrap_or_default(),
            uid: mg.meta().uid.clone(),
        }
    }

    /// Name of the usage object: the managed resource UID when known
    pub fn usage_name(&self) -> String {
        self.uid
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.kind.to_lowercase(), self.name))
    }
}

/// ProviderConfig lookups and usage tracking
#[async_trait]
pub trait ProviderConfigStore: Send + Sync + Debug {
    /// Record that a managed resource uses a ProviderConfig (idempotent)
    async fn track_usage(&self, usage: &UsageRef) -> Result<(), StoreError>;

    async fn get_provider_config(&self, name: &str) -> Result<ProviderConfig, StoreError>;
}

/// Read access to Secret keys, used to resolve credentials
#[async_trait]
pub trait SecretSource: Send + Sync + Debug {
    /// Value of `key` in Secret `namespace/name`; `None` if the key is absent
    async fn get_secret_key(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StoreError>;
}
