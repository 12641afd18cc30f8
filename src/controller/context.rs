//! # Operation Context
//!
//! Every blocking call made during a reconciliation attempt (store reads and
//! writes, credential lookups, PlanetScale API calls) runs through an
//! [`OpContext`]. The context carries the attempt deadline and a cancellation
//! token derived from the process-wide shutdown token.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a call was abandoned before it completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

/// Deadline and cancellation scope of one reconciliation attempt
#[derive(Debug, Clone)]
pub struct OpContext {
    deadline: Instant,
    cancel: CancellationToken,
}

impl OpContext {
    /// Context expiring `timeout` from now, cancelled together with `parent`
    pub fn new(timeout: Duration, parent: &CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: parent.child_token(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel this attempt only; the parent token is unaffected
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run `fut` until it completes, the deadline passes, or the context is cancelled
    pub async fn run<T, E, F>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<Interrupted>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Interrupted::Cancelled.into()),
            result = tokio::time::timeout_at(self.deadline, fut) => match result {
                Ok(inner) => inner,
                Err(_elapsed) => Err(Interrupted::DeadlineExceeded.into()),
            },
        }
    }
}
