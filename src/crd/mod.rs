//! # Custom Resource Definitions
//!
//! CRD types for the PlanetScale provider.
//!
//! Managed resources (`Database`, `Password`) implement [`Managed`] so the
//! reconciliation engine can drive them generically. `ProviderConfig` and
//! `ProviderConfigUsage` carry credentials and usage tracking.

mod common;
mod database;
mod managed;
mod password;
mod provider;
mod status;

pub use common::{
    DeletionPolicy, ProviderConfigReference, ResourceSpec, SecretKeySelector, SecretReference,
};
pub use database::{Database, DatabaseObservation, DatabaseParameters, DatabaseSpec, DatabaseStatus};
pub use managed::Managed;
pub use password::{Password, PasswordObservation, PasswordParameters, PasswordSpec, PasswordStatus};
pub use provider::{
    CredentialsSource, EnvSelector, FsSelector, ProviderConfig, ProviderConfigSpec,
    ProviderConfigStatus, ProviderConfigUsage, ProviderConfigUsageSpec, ProviderCredentials,
    TypedReference,
};
pub use status::{
    Condition, ConditionReason, ConditionStatus, ConditionType, ManagedStatus, ResourceStatus,
};
