//! # Managed Reconciler
//!
//! Generic reconciliation engine shared by every managed resource kind.
//!
//! - `types`: the reconciler and its error type
//! - `reconcile`: one observe/create/update/delete pass
//! - `status`: metadata and status persistence
//! - `backoff`: per-resource backoff and the global rate limiter

pub mod backoff;
mod reconcile;
mod status;
mod types;

pub use backoff::{GlobalRateLimiter, RateLimiterConfig};
pub use reconcile::reconcile;
pub use types::{ManagedReconciler, ReconcileError, ReconcilerConfig};
