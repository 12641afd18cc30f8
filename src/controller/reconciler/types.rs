//! # Reconciler Types
//!
//! The generic reconciler and its error type.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::backoff::GlobalRateLimiter;
use crate::config::ControllerConfig;
use crate::controller::connector::ConnectError;
use crate::controller::external::{ExternalConnector, ExternalError};
use crate::controller::publisher::{ConnectionPublisher, PublishError};
use crate::controller::store::{ResourceStore, StoreError};
use crate::crd::{ConditionReason, Managed};

/// Error from one reconciliation pass
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("cannot observe external resource: {0}")]
    Observe(#[source] ExternalError),

    #[error("cannot create external resource: {0}")]
    Create(#[source] ExternalError),

    #[error("cannot update external resource: {0}")]
    Update(#[source] ExternalError),

    #[error("cannot delete external resource: {0}")]
    Delete(#[source] ExternalError),

    #[error("cannot publish connection details: {0}")]
    Publish(#[source] PublishError),

    #[error("cannot unpublish connection details: {0}")]
    Unpublish(#[source] PublishError),

    #[error("cannot update managed resource: {0}")]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Reason recorded on the Synced condition
    pub fn reason(&self) -> ConditionReason {
        match self {
            Self::Connect(_) => ConditionReason::ConnectError,
            Self::Observe(_) => ConditionReason::ObserveError,
            Self::Create(_) => ConditionReason::CreateError,
            Self::Update(_) => ConditionReason::UpdateError,
            Self::Delete(_) | Self::Unpublish(_) => ConditionReason::DeleteError,
            Self::Publish(_) => ConditionReason::PublishConnectionError,
            Self::Store(_) => ConditionReason::ReconcileError,
        }
    }

    /// A write lost an optimistic concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}

/// Timing settings of a reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Requeue delay after a successful pass
    pub poll_interval: Duration,
    /// Deadline for all calls made during one pass
    pub reconcile_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(crate::constants::DEFAULT_POLL_INTERVAL_SECS),
            reconcile_timeout: Duration::from_secs(
                crate::constants::DEFAULT_RECONCILE_TIMEOUT_SECS,
            ),
        }
    }
}

impl From<&ControllerConfig> for ReconcilerConfig {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            reconcile_timeout: config.reconcile_timeout,
        }
    }
}

/// Reconciler for one managed resource kind
///
/// Holds everything a pass needs; the kube controller shares it between
/// workers through an `Arc`.
pub struct ManagedReconciler<K: Managed> {
    pub(super) store: Arc<dyn ResourceStore<K>>,
    pub(super) connector: Arc<dyn ExternalConnector<K>>,
    pub(super) publisher: Arc<dyn ConnectionPublisher<K>>,
    pub(super) limiter: Arc<GlobalRateLimiter>,
    pub(super) config: ReconcilerConfig,
    pub(super) shutdown: CancellationToken,
}

impl<K: Managed> ManagedReconciler<K> {
    pub fn new(
        store: Arc<dyn ResourceStore<K>>,
        connector: Arc<dyn ExternalConnector<K>>,
        publisher: Arc<dyn ConnectionPublisher<K>>,
        limiter: Arc<GlobalRateLimiter>,
        config: ReconcilerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            connector,
            publisher,
            limiter,
            config,
            shutdown,
        }
    }

    pub fn config(&self) -> ReconcilerConfig {
        self.config
    }

    pub fn limiter(&self) -> &Arc<GlobalRateLimiter> {
        &self.limiter
    }

    /// Backoff key of the named resource
    pub fn limiter_key(&self, name: &str) -> String {
        GlobalRateLimiter::key(&K::kind(&()), name)
    }
}

impl<K: Managed> fmt::Debug for ManagedReconciler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedReconciler")
            .field("kind", &K::kind(&()))
            .field("connector", &self.connector)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
