//! # Reconciliation Pass
//!
//! One pass takes a managed resource from whatever state it is in one step
//! closer to its desired state:
//!
//! 1. Load the resource; a missing resource ends the pass
//! 2. Ask the global rate limiter for admission
//! 3. Deleting resources are finalized (delete external, unpublish, drop finalizer)
//! 4. Otherwise: finalizer, connect, observe, then create, update or nothing.
//!    A create whose connection details cannot be published is rolled back
//! 5. Persist status when it changed and requeue at the poll interval
//!
//! Every failure records `Synced=False` with a reason before the error is
//! handed to the error policy for backoff.

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::{debug, info, info_span, warn, Instrument};

use super::status::{persist_metadata, persist_status};
use super::types::{ManagedReconciler, ReconcileError};
use crate::controller::context::OpContext;
use crate::controller::external::{ConnectionDetails, ExternalClient, Readiness};
use crate::crd::{Condition, DeletionPolicy, Managed};
use crate::observability::metrics;

impl<K: Managed> ManagedReconciler<K> {
    /// Run one reconciliation pass for the named resource
    pub async fn reconcile(&self, name: &str) -> Result<Action, ReconcileError> {
        let kind = K::kind(&());
        let span = info_span!("reconcile", resource.kind = %kind, resource.name = %name);
        async move {
            let start = Instant::now();
            metrics::increment_reconciliations(&kind);
            let ctx = OpContext::new(self.config.reconcile_timeout, &self.shutdown);
            let result = self.reconcile_once(&ctx, name).await;
            metrics::observe_reconciliation_duration(&kind, start.elapsed().as_secs_f64());
            result
        }
        .instrument(span)
        .await
    }

    async fn reconcile_once(&self, ctx: &OpContext, name: &str) -> Result<Action, ReconcileError> {
        let key = self.limiter_key(name);
        let Some(mut mg) = ctx.run(self.store.get(name)).await? else {
            debug!("Managed resource no longer exists");
            self.limiter.forget(&key);
            return Ok(Action::await_change());
        };

        if let Some(delay) = self.limiter.admit() {
            debug!(
                delay_ms = delay.as_millis() as u64,
                "Global reconcile rate reached, deferring pass"
            );
            metrics::increment_requeues_total(&K::kind(&()), "rate-limited");
            return Ok(Action::requeue(delay));
        }

        let mut baseline = mg.clone();
        let result = if mg.is_deleting() {
            self.finalize(ctx, &mut mg, &mut baseline).await
        } else {
            self.sync(ctx, &mut mg, &mut baseline).await
        };

        match result {
            Ok(action) => {
                self.limiter.forget(&key);
                Ok(action)
            }
            Err(error) => self.fail(mg, &baseline, error).await,
        }
    }

    /// Observe the external resource and converge it on the desired state
    async fn sync(
        &self,
        ctx: &OpContext,
        mg: &mut K,
        baseline: &mut K,
    ) -> Result<Action, ReconcileError> {
        if mg.add_managed_finalizer() {
            debug!("Adding finalizer");
            *baseline = persist_metadata(ctx, &*self.store, mg).await?;
        }

        let client = self.connector.connect(ctx, mg).await?;
        let observation = client
            .observe(ctx, mg)
            .await
            .map_err(ReconcileError::Observe)?;

        if let Some(at_provider) = observation.at_provider.clone() {
            mg.managed_status_mut().at_provider = Some(at_provider);
        }

        if let Some(adopted) = observation.external_name.as_deref() {
            match mg.external_name().map(str::to_string) {
                None => {
                    info!(external_name = %adopted, "Adopting existing external resource");
                    mg.set_external_name(adopted);
                    *baseline = persist_metadata(ctx, &*self.store, mg).await?;
                }
                Some(bound) if bound != adopted => {
                    warn!(
                        external_name = %bound,
                        observed = %adopted,
                        "Observed external resource does not match the bound external name"
                    );
                }
                Some(_) => {}
            }
        }

        if !observation.resource_exists {
            let creation = client
                .create(ctx, mg)
                .await
                .map_err(ReconcileError::Create)?;

            // Secrets in the create response are not returned again
            if let Err(error) = self.publish(ctx, mg, &creation.connection_details).await {
                self.roll_back_create(&*client, mg, creation.external_name.as_deref())
                    .await;
                return Err(error);
            }

            // The bound name, if any, was just observed absent
            if let Some(created) = creation.external_name.as_deref() {
                let bound = mg.external_name().map(str::to_string);
                if bound.as_deref() != Some(created) {
                    if let Some(previous) = bound {
                        info!(
                            previous = %previous,
                            external_name = %created,
                            "Bound external resource is gone, binding its replacement"
                        );
                    }
                    mg.set_external_name(created);
                    *baseline = persist_metadata(ctx, &*self.store, mg).await?;
                }
            }
            if let Some(at_provider) = creation.at_provider {
                mg.managed_status_mut().at_provider = Some(at_provider);
            }

            info!(external_name = ?mg.external_name(), "Created external resource");
            let status = &mut mg.managed_status_mut().resource;
            status.set_condition(Condition::reconcile_success());
            status.set_condition(Condition::creating());
            return self.finish(ctx, mg, baseline).await;
        }

        self.publish(ctx, mg, &observation.connection_details)
            .await?;

        if !observation.resource_up_to_date {
            debug!("External resource is not up to date, updating");
            let update = client
                .update(ctx, mg)
                .await
                .map_err(ReconcileError::Update)?;
            self.publish(ctx, mg, &update.connection_details).await?;
        }

        let ready = match observation.readiness {
            Readiness::Available => self.connection_readiness(ctx, mg).await?,
            Readiness::Unavailable(state) => Condition::unavailable(state),
        };
        let status = &mut mg.managed_status_mut().resource;
        status.set_condition(ready);
        status.set_condition(Condition::reconcile_success());
        self.finish(ctx, mg, baseline).await
    }

    /// Delete the external resource (unless orphaned) and release the finalizer
    async fn finalize(
        &self,
        ctx: &OpContext,
        mg: &mut K,
        baseline: &mut K,
    ) -> Result<Action, ReconcileError> {
        if !mg.has_managed_finalizer() {
            debug!("Resource is deleting and holds no finalizer of ours");
            return Ok(Action::await_change());
        }
        mg.managed_status_mut()
            .resource
            .set_condition(Condition::deleting());

        match mg.deletion_policy() {
            DeletionPolicy::Delete => {
                let client = self.connector.connect(ctx, mg).await?;
                client
                    .delete(ctx, mg)
                    .await
                    .map_err(ReconcileError::Delete)?;
                info!(external_name = ?mg.external_name(), "Deleted external resource");
            }
            DeletionPolicy::Orphan => {
                info!(external_name = ?mg.external_name(), "Orphaning external resource");
            }
        }

        self.publisher
            .unpublish(ctx, mg)
            .await
            .map_err(ReconcileError::Unpublish)?;

        mg.remove_managed_finalizer();
        *baseline = persist_metadata(ctx, &*self.store, mg).await?;
        Ok(Action::await_change())
    }

    async fn publish(
        &self,
        ctx: &OpContext,
        mg: &K,
        details: &ConnectionDetails,
    ) -> Result<(), ReconcileError> {
        if details.is_empty() {
            return Ok(());
        }
        self.publisher
            .publish(ctx, mg, details)
            .await
            .map_err(ReconcileError::Publish)
    }

    /// Delete an external resource created this pass whose connection
    /// details could not be stored, leaving its name unbound
    async fn roll_back_create(
        &self,
        client: &dyn ExternalClient<K>,
        mg: &K,
        created: Option<&str>,
    ) {
        let mut orphan = mg.clone();
        if let Some(name) = created {
            orphan.set_external_name(name);
        }
        let ctx = OpContext::new(self.config.reconcile_timeout, &self.shutdown);
        match client.delete(&ctx, &orphan).await {
            Ok(()) => info!(
                external_name = ?created,
                "Deleted external resource whose connection details were not published"
            ),
            Err(e) => warn!(
                external_name = ?created,
                error = %e,
                "Failed to delete external resource whose connection details were not published"
            ),
        }
    }

    /// Ready=True unless the connection Secret lacks keys the kind requires
    async fn connection_readiness(
        &self,
        ctx: &OpContext,
        mg: &K,
    ) -> Result<Condition, ReconcileError> {
        if K::CONNECTION_KEYS.is_empty() {
            return Ok(Condition::available());
        }
        let missing = self
            .publisher
            .missing_keys(ctx, mg, K::CONNECTION_KEYS)
            .await
            .map_err(ReconcileError::Publish)?;
        if missing.is_empty() {
            return Ok(Condition::available());
        }
        debug!(missing = ?missing, "Connection secret is incomplete");
        Ok(Condition::unavailable(format!(
            "connection secret is missing keys: {}",
            missing.join(", ")
        )))
    }

    async fn finish(
        &self,
        ctx: &OpContext,
        mg: &mut K,
        baseline: &K,
    ) -> Result<Action, ReconcileError> {
        persist_status(ctx, &*self.store, mg, baseline).await?;
        metrics::increment_requeues_total(&K::kind(&()), "poll");
        Ok(Action::requeue(self.config.poll_interval))
    }

    /// Record the failure on the Synced condition and hand the error back
    ///
    /// The status write gets a fresh context: the pass context may be the
    /// reason the pass failed.
    async fn fail(
        &self,
        mut mg: K,
        baseline: &K,
        error: ReconcileError,
    ) -> Result<Action, ReconcileError> {
        let reason = error.reason();
        metrics::increment_reconciliation_errors(&K::kind(&()), reason.as_str());
        warn!(error = %error, reason = %reason, "Reconciliation failed");

        if error.is_conflict() {
            debug!(
                reason = %reason,
                "Resource changed during the pass, skipping the status write and retrying from scratch"
            );
            return Err(error);
        }

        mg.managed_status_mut()
            .resource
            .set_condition(Condition::reconcile_error(reason, error.to_string()));
        let ctx = OpContext::new(self.config.reconcile_timeout, &self.shutdown);
        if let Err(e) = persist_status(&ctx, &*self.store, &mut mg, baseline).await {
            warn!(error = %e, "Failed to record reconcile error on status");
        }
        Err(error)
    }
}

/// Entry point for `kube_runtime::Controller::run`
pub async fn reconcile<K: Managed>(
    obj: Arc<K>,
    reconciler: Arc<ManagedReconciler<K>>,
) -> Result<Action, ReconcileError> {
    reconciler.reconcile(&obj.name_any()).await
}
