//! # Error Policy
//!
//! Backoff for failed reconciliation passes and logging of controller stream
//! results.

use std::sync::Arc;

use kube::ResourceExt;
use kube_runtime::controller::{Action, Error as ControllerError};
use kube_runtime::reflector::ObjectRef;
use tracing::{debug, error, warn};

use crate::controller::reconciler::{ManagedReconciler, ReconcileError};
use crate::crd::Managed;
use crate::observability::metrics;

/// Requeue a failed resource after its jittered exponential backoff
///
/// Backoff state lives in the shared rate limiter and is reset by the next
/// successful pass.
pub fn error_policy<K: Managed>(
    obj: Arc<K>,
    error: &ReconcileError,
    reconciler: Arc<ManagedReconciler<K>>,
) -> Action {
    let kind = K::kind(&());
    let key = reconciler.limiter_key(&obj.name_any());
    let delay = reconciler.limiter().next_backoff(&key);
    let failures = reconciler.limiter().failures(&key);

    warn!(
        resource.kind = %kind,
        resource.name = %obj.name_any(),
        error = %error,
        failures,
        delay_ms = delay.as_millis() as u64,
        "Retrying with backoff"
    );
    metrics::increment_requeues_total(&kind, "error-backoff");
    Action::requeue(delay)
}

/// Log the outcome of one controller stream item
pub fn log_reconcile_result<K, E, QE>(
    kind: String,
) -> impl Fn(Result<(ObjectRef<K>, Action), ControllerError<E, QE>>) -> std::future::Ready<()>
where
    K: kube::Resource,
    E: std::error::Error + 'static,
    QE: std::error::Error + 'static,
{
    move |result| {
        match result {
            Ok((obj, action)) => {
                debug!(resource.kind = %kind, resource.name = %obj.name, ?action, "Reconciliation completed");
            }
            Err(ControllerError::ReconcilerFailed(e, obj)) => {
                debug!(resource.kind = %kind, resource.name = %obj.name, error = %e, "Reconciliation failed");
            }
            Err(e) => {
                error!(resource.kind = %kind, error = %e, "Controller stream error");
            }
        }
        std::future::ready(())
    }
}
