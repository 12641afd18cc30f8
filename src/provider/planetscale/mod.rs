//! # PlanetScale Provider
//!
//! The [`PlanetScaleApi`] trait is the seam between the per-kind external
//! clients and the PlanetScale service. [`PlanetScaleClient`] talks to the
//! REST API with reqwest and rustls. The in-memory `MockPlanetScale` is built
//! for tests and with the `mock` feature.

mod client;
mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod types;

pub use client::PlanetScaleClient;
pub use error::ApiError;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockPlanetScale;
pub use types::{
    BranchInfo, BranchRef, CreateDatabaseRequest, CreatePasswordRequest, DatabaseInfo,
    PasswordInfo, Region,
};

use async_trait::async_trait;

/// Operations the provider needs from PlanetScale
///
/// `ApiError::NotFound` and `ApiError::AlreadyExists` must be reported as such
/// so callers can treat them as absent / already created.
#[async_trait]
pub trait PlanetScaleApi: Send + Sync + std::fmt::Debug {
    async fn get_database(&self, organization: &str, name: &str) -> Result<DatabaseInfo, ApiError>;

    async fn create_database(
        &self,
        organization: &str,
        request: &CreateDatabaseRequest,
    ) -> Result<DatabaseInfo, ApiError>;

    async fn delete_database(&self, organization: &str, name: &str) -> Result<(), ApiError>;

    async fn get_password(&self, branch: &BranchRef, id: &str) -> Result<PasswordInfo, ApiError>;

    async fn list_passwords(&self, branch: &BranchRef) -> Result<Vec<PasswordInfo>, ApiError>;

    async fn create_password(
        &self,
        branch: &BranchRef,
        request: &CreatePasswordRequest,
    ) -> Result<PasswordInfo, ApiError>;

    async fn delete_password(&self, branch: &BranchRef, id: &str) -> Result<(), ApiError>;
}
