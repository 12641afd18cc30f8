//! # Connection Publisher
//!
//! Writes connection details into the Secret named by
//! `spec.writeConnectionSecretToRef` and removes it when the managed resource
//! is deleted. Resources without a target Secret are skipped.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use thiserror::Error;
use tracing::debug;

use super::context::{Interrupted, OpContext};
use super::external::ConnectionDetails;
use crate::constants::FIELD_MANAGER;
use crate::crd::{Managed, SecretReference};

/// Secret type used for connection secrets
pub const CONNECTION_SECRET_TYPE: &str = "connection.crossplane.io/v1alpha1";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("cannot apply connection secret {namespace}/{name}: {source}")]
    Apply {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("cannot read connection secret {namespace}/{name}: {source}")]
    Read {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("cannot delete connection secret {namespace}/{name}: {source}")]
    Delete {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("connection secret rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Stores and removes the connection details of a managed resource
#[async_trait]
pub trait ConnectionPublisher<K: Managed>: Send + Sync + Debug {
    async fn publish(
        &self,
        ctx: &OpContext,
        mg: &K,
        details: &ConnectionDetails,
    ) -> Result<(), PublishError>;

    /// Remove published details; an absent Secret is success
    async fn unpublish(&self, ctx: &OpContext, mg: &K) -> Result<(), PublishError>;

    /// Keys of `required` the published Secret does not hold
    ///
    /// A resource without a target Secret is never missing anything.
    async fn missing_keys(
        &self,
        ctx: &OpContext,
        mg: &K,
        required: &[&str],
    ) -> Result<Vec<String>, PublishError>;
}

fn absent_keys(
    required: &[&str],
    mut present: impl FnMut(&str) -> bool,
) -> Vec<String> {
    required
        .iter()
        .filter(|key| !present(**key))
        .map(|key| (*key).to_string())
        .collect()
}

/// Publisher writing Kubernetes Secrets with server-side apply
pub struct SecretPublisher<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> SecretPublisher<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> Debug for SecretPublisher<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretPublisher").finish_non_exhaustive()
    }
}

/// Build the connection Secret for `target`, owned by the managed resource
pub fn connection_secret<K: Managed>(
    mg: &K,
    target: &SecretReference,
    details: &ConnectionDetails,
) -> Secret {
    let data: BTreeMap<String, ByteString> = details
        .iter()
        .map(|(key, value)| (key.to_string(), ByteString(value.to_vec())))
        .collect();
    Secret {
        metadata: ObjectMeta {
            name: Some(target.name.clone()),
            namespace: Some(target.namespace.clone()),
            owner_references: mg.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        data: Some(data),
        type_: Some(CONNECTION_SECRET_TYPE.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl<K: Managed> ConnectionPublisher<K> for SecretPublisher<K> {
    async fn publish(
        &self,
        ctx: &OpContext,
        mg: &K,
        details: &ConnectionDetails,
    ) -> Result<(), PublishError> {
        let Some(target) = mg.resource_spec().write_connection_secret_to_ref.as_ref() else {
            return Ok(());
        };
        let secret = connection_secret(mg, target, details);
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &target.namespace);
        debug!(
            resource.name = %mg.name_any(),
            secret.namespace = %target.namespace,
            secret.name = %target.name,
            keys = ?details,
            "Publishing connection details"
        );
        ctx.run(async {
            api.patch(
                &target.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&secret),
            )
            .await
            .map_err(|source| PublishError::Apply {
                namespace: target.namespace.clone(),
                name: target.name.clone(),
                source,
            })
        })
        .await?;
        Ok(())
    }

    async fn unpublish(&self, ctx: &OpContext, mg: &K) -> Result<(), PublishError> {
        let Some(target) = mg.resource_spec().write_connection_secret_to_ref.as_ref() else {
            return Ok(());
        };
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &target.namespace);
        ctx.run(async {
            match api.delete(&target.name, &DeleteParams::default()).await {
                Ok(_) => Ok(()),
                Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
                Err(source) => Err(PublishError::Delete {
                    namespace: target.namespace.clone(),
                    name: target.name.clone(),
                    source,
                }),
            }
        })
        .await
    }

    async fn missing_keys(
        &self,
        ctx: &OpContext,
        mg: &K,
        required: &[&str],
    ) -> Result<Vec<String>, PublishError> {
        let Some(target) = mg.resource_spec().write_connection_secret_to_ref.as_ref() else {
            return Ok(Vec::new());
        };
        if required.is_empty() {
            return Ok(Vec::new());
        }
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &target.namespace);
        let secret = ctx
            .run(async {
                api.get_opt(&target.name)
                    .await
                    .map_err(|source| PublishError::Read {
                        namespace: target.namespace.clone(),
                        name: target.name.clone(),
                        source,
                    })
            })
            .await?;
        let data = secret.and_then(|s| s.data).unwrap_or_default();
        Ok(absent_keys(required, |key| {
            data.get(key).is_some_and(|value| !value.0.is_empty())
        }))
    }
}

/// Publisher keeping connection details in memory
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    secrets: Mutex<BTreeMap<(String, String), ConnectionDetails>>,
    publishes: Mutex<usize>,
    reject: Mutex<bool>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<ConnectionDetails> {
        Self::lock(&self.secrets)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn publishes(&self) -> usize {
        *Self::lock(&self.publishes)
    }

    /// Reject publish calls until reset
    pub fn set_reject(&self, reject: bool) {
        *Self::lock(&self.reject) = reject;
    }
}

#[async_trait]
impl<K: Managed> ConnectionPublisher<K> for MemoryPublisher {
    async fn publish(
        &self,
        _ctx: &OpContext,
        mg: &K,
        details: &ConnectionDetails,
    ) -> Result<(), PublishError> {
        let Some(target) = mg.resource_spec().write_connection_secret_to_ref.as_ref() else {
            return Ok(());
        };
        if *Self::lock(&self.reject) {
            return Err(PublishError::Rejected(format!(
                "{}/{}",
                target.namespace, target.name
            )));
        }
        let mut secrets = Self::lock(&self.secrets);
        let stored = secrets
            .entry((target.namespace.clone(), target.name.clone()))
            .or_default();
        for (key, value) in details.iter() {
            stored.insert(key, value);
        }
        *Self::lock(&self.publishes) += 1;
        Ok(())
    }

    async fn unpublish(&self, _ctx: &OpContext, mg: &K) -> Result<(), PublishError> {
        if let Some(target) = mg.resource_spec().write_connection_secret_to_ref.as_ref() {
            Self::lock(&self.secrets).remove(&(target.namespace.clone(), target.name.clone()));
        }
        Ok(())
    }

    async fn missing_keys(
        &self,
        _ctx: &OpContext,
        mg: &K,
        required: &[&str],
    ) -> Result<Vec<String>, PublishError> {
        let Some(target) = mg.resource_spec().write_connection_secret_to_ref.as_ref() else {
            return Ok(Vec::new());
        };
        let secrets = Self::lock(&self.secrets);
        let stored = secrets.get(&(target.namespace.clone(), target.name.clone()));
        Ok(absent_keys(required, |key| {
            stored.and_then(|details| details.get(key)).is_some()
        }))
    }
}
