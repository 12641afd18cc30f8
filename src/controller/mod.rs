//! # Controller
//!
//! The reconciliation engine and everything it is wired to.
//!
//! - `reconciler`: generic observe/create/update/delete loop
//! - `external`, `connector`: the seam to external systems
//! - `database`, `password`: PlanetScale clients per resource kind
//! - `credentials`, `publisher`, `store`: Kubernetes-side plumbing
//! - `providerconfig`: ProviderConfig usage tracking
//! - `server`: metrics and probes

pub mod connector;
pub mod context;
pub mod credentials;
pub mod database;
pub mod external;
pub mod password;
pub mod providerconfig;
pub mod publisher;
pub mod reconciler;
pub mod server;
pub mod store;
