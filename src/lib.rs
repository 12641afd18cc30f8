//! # provider-planetscale
//!
//! A Kubernetes operator that keeps PlanetScale resources in line with
//! cluster-scoped custom resources.
//!
//! ## Overview
//!
//! For every managed resource kind the operator runs a control loop that:
//!
//! 1. **Connects** - resolves the referenced `ProviderConfig` and its credentials
//! 2. **Observes** - looks the external resource up by its external name
//! 3. **Converges** - creates, updates or deletes the external resource
//! 4. **Reports** - records `Ready`/`Synced` conditions and `status.atProvider`
//!
//! ## Resources
//!
//! - `Database` (`database.planetscale.crossplane.io/v1alpha1`): a PlanetScale database
//! - `Password` (`branch.planetscale.crossplane.io/v1alpha1`): a branch password, whose
//!   connection details are written to a Kubernetes Secret
//! - `ProviderConfig` / `ProviderConfigUsage` (`planetscale.crossplane.io/v1alpha1`)
//!
//! ## Usage
//!
//! See the [README.md](../README.md) for deployment and examples.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod provider;
pub mod runtime;
