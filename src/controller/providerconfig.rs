//! # ProviderConfig Usage Controller
//!
//! Counts the ProviderConfigUsages pointing at each ProviderConfig, records
//! the count in `status.users` and holds the `in-use` finalizer while any
//! usage remains. A ProviderConfig that is still in use is never released for
//! deletion; it goes away once its last user does.

use std::sync::Arc;
use std::time::Duration;

use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::constants::{IN_USE_FINALIZER, PROVIDER_CONFIG_LABEL, PROVIDER_CONFIG_REQUEUE_SECS};
use crate::crd::{ProviderConfig, ProviderConfigUsage};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("cannot list usages of ProviderConfig {name}: {source}")]
    ListUsages {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("cannot update ProviderConfig {name}: {source}")]
    Update {
        name: String,
        #[source]
        source: kube::Error,
    },
}

/// Change to the in-use finalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerChange {
    Add,
    Remove,
    Keep,
}

/// What one pass over a ProviderConfig must write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsagePlan {
    pub users: i64,
    pub finalizer: FinalizerChange,
    /// `status.users` differs from the counted users
    pub status_changed: bool,
}

/// Decide the finalizer and status writes for a ProviderConfig with `users` usages
pub fn plan(pc: &ProviderConfig, users: i64) -> UsagePlan {
    let has_finalizer = pc.finalizers().iter().any(|f| f == IN_USE_FINALIZER);
    let deleting = pc.meta().deletion_timestamp.is_some();

    let finalizer = match (deleting, has_finalizer, users > 0) {
        (true, true, false) => FinalizerChange::Remove,
        (false, false, _) => FinalizerChange::Add,
        _ => FinalizerChange::Keep,
    };
    let current = pc.status.as_ref().map_or(0, |s| s.users);

    UsagePlan {
        users,
        finalizer,
        status_changed: current != users,
    }
}

/// One write of a usage pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageWrite {
    Status { users: i64 },
    Finalizers(Vec<String>),
}

/// Writes a plan needs, in the order they are sent
///
/// Each write carries the `resourceVersion` returned by the one before it.
pub fn writes(pc: &ProviderConfig, plan: UsagePlan) -> Vec<UsageWrite> {
    let mut writes = Vec::new();
    if plan.status_changed {
        writes.push(UsageWrite::Status { users: plan.users });
    }
    let mut finalizers = pc.finalizers().to_vec();
    match plan.finalizer {
        FinalizerChange::Keep => return writes,
        FinalizerChange::Add => finalizers.push(IN_USE_FINALIZER.to_string()),
        FinalizerChange::Remove => finalizers.retain(|f| f != IN_USE_FINALIZER),
    }
    writes.push(UsageWrite::Finalizers(finalizers));
    writes
}

/// Optimistic merge patch replacing the finalizers
pub fn finalizer_patch(finalizers: &[String], resource_version: Option<&str>) -> serde_json::Value {
    json!({
        "metadata": {
            "resourceVersion": resource_version,
            "finalizers": finalizers,
        }
    })
}

/// Map a usage back to the ProviderConfig it pins
pub fn usage_owner(usage: &ProviderConfigUsage) -> Option<ObjectRef<ProviderConfig>> {
    usage
        .labels()
        .get(PROVIDER_CONFIG_LABEL)
        .map(|name| ObjectRef::new(name))
}

/// Shared state of the usage controller
#[derive(Clone)]
pub struct ProviderConfigReconciler {
    configs: Api<ProviderConfig>,
    usages: Api<ProviderConfigUsage>,
}

impl std::fmt::Debug for ProviderConfigReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfigReconciler").finish_non_exhaustive()
    }
}

impl ProviderConfigReconciler {
    pub fn new(client: Client) -> Self {
        Self {
            configs: Api::all(client.clone()),
            usages: Api::all(client),
        }
    }

    async fn count_users(&self, name: &str) -> Result<i64, UsageError> {
        let params = ListParams::default().labels(&format!("{PROVIDER_CONFIG_LABEL}={name}"));
        let usages = self
            .usages
            .list(&params)
            .await
            .map_err(|source| UsageError::ListUsages {
                name: name.to_string(),
                source,
            })?;
        Ok(usages.items.len() as i64)
    }

    async fn apply(&self, pc: &ProviderConfig, plan: UsagePlan) -> Result<(), UsageError> {
        let name = pc.name_any();
        let update_error = |source| UsageError::Update {
            name: name.clone(),
            source,
        };

        let mut resource_version = pc.resource_version();
        for write in writes(pc, plan) {
            let updated = match write {
                UsageWrite::Status { users } => {
                    let patch = json!({ "status": { "users": users } });
                    self.configs
                        .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
                        .await
                }
                UsageWrite::Finalizers(finalizers) => {
                    let patch = finalizer_patch(&finalizers, resource_version.as_deref());
                    self.configs
                        .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                        .await
                }
            }
            .map_err(update_error)?;
            resource_version = updated.resource_version();
        }
        Ok(())
    }
}

/// Entry point for `kube_runtime::Controller::run`
pub async fn reconcile(
    pc: Arc<ProviderConfig>,
    ctx: Arc<ProviderConfigReconciler>,
) -> Result<Action, UsageError> {
    let name = pc.name_any();
    let span = info_span!("reconcile", resource.kind = "ProviderConfig", resource.name = %name);
    async move {
        metrics::increment_reconciliations("ProviderConfig");
        let users = ctx.count_users(&name).await?;
        let plan = plan(&pc, users);
        debug!(users, finalizer = ?plan.finalizer, "ProviderConfig usage counted");
        metrics::set_provider_config_users(&name, users);

        if pc.meta().deletion_timestamp.is_some() && users > 0 {
            info!(users, "ProviderConfig is still in use, keeping it");
        }
        ctx.apply(&pc, plan).await?;

        if plan.finalizer == FinalizerChange::Remove {
            info!("ProviderConfig is no longer in use, releasing it");
            return Ok(Action::await_change());
        }
        Ok(Action::requeue(Duration::from_secs(
            PROVIDER_CONFIG_REQUEUE_SECS,
        )))
    }
    .instrument(span)
    .await
}

pub fn error_policy(
    pc: Arc<ProviderConfig>,
    error: &UsageError,
    _ctx: Arc<ProviderConfigReconciler>,
) -> Action {
    warn!(resource.name = %pc.name_any(), error = %error, "ProviderConfig reconciliation failed");
    metrics::increment_reconciliation_errors("ProviderConfig", "UsageError");
    metrics::increment_requeues_total("ProviderConfig", "error-backoff");
    Action::requeue(Duration::from_secs(PROVIDER_CONFIG_REQUEUE_SECS))
}
