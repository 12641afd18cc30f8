//! # External Clients
//!
//! The engine only sees external systems through these traits. A connector
//! turns a managed resource into a client for its external counterpart; the
//! client observes, creates, updates and deletes that counterpart.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use zeroize::Zeroizing;

use super::connector::ConnectError;
use super::context::{Interrupted, OpContext};
use crate::crd::Managed;
use crate::provider::planetscale::ApiError;

/// Named secret values needed to connect to an external resource
///
/// Values are wiped from memory on drop. `Debug` prints the keys only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionDetails(BTreeMap<String, Zeroizing<Vec<u8>>>);

impl ConnectionDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.0.insert(key.into(), Zeroizing::new(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(|v| v.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for ConnectionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Readiness signal reported by the external system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Available,
    /// Exists but is not usable yet; carries the external state
    Unavailable(String),
}

/// Result of observing an external resource
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalObservation<O> {
    pub resource_exists: bool,
    /// Every field desired state can influence matches
    pub resource_up_to_date: bool,
    pub readiness: Readiness,
    pub at_provider: Option<O>,
    /// Name the resource was found under when it was adopted without one
    pub external_name: Option<String>,
    pub connection_details: ConnectionDetails,
}

impl<O> ExternalObservation<O> {
    /// The external resource does not exist
    pub fn absent() -> Self {
        Self {
            resource_exists: false,
            resource_up_to_date: false,
            readiness: Readiness::Unavailable("absent".to_string()),
            at_provider: None,
            external_name: None,
            connection_details: ConnectionDetails::new(),
        }
    }

    /// The external resource exists
    pub fn present(up_to_date: bool, readiness: Readiness, at_provider: O) -> Self {
        Self {
            resource_exists: true,
            resource_up_to_date: up_to_date,
            readiness,
            at_provider: Some(at_provider),
            external_name: None,
            connection_details: ConnectionDetails::new(),
        }
    }
}

/// Result of creating an external resource
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCreation<O> {
    pub external_name: Option<String>,
    pub at_provider: Option<O>,
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalUpdate {
    pub connection_details: ConnectionDetails,
}

/// Errors from an external client
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The managed resource cannot be mapped to an external call
    #[error("invalid resource: {0}")]
    InvalidResource(String),
}

impl From<Interrupted> for ExternalError {
    fn from(e: Interrupted) -> Self {
        Self::Api(ApiError::Interrupted(e))
    }
}

/// Builds an [`ExternalClient`] for a managed resource
#[async_trait]
pub trait ExternalConnector<K: Managed>: Send + Sync + fmt::Debug {
    async fn connect(
        &self,
        ctx: &OpContext,
        mg: &K,
    ) -> Result<Box<dyn ExternalClient<K>>, ConnectError>;
}

/// Operations on the external counterpart of a managed resource
///
/// `observe` must not mutate the external system. `create` is only called
/// after an observation reported the resource absent.
#[async_trait]
pub trait ExternalClient<K: Managed>: Send + Sync {
    async fn observe(
        &self,
        ctx: &OpContext,
        mg: &K,
    ) -> Result<ExternalObservation<K::Observation>, ExternalError>;

    async fn create(
        &self,
        ctx: &OpContext,
        mg: &K,
    ) -> Result<ExternalCreation<K::Observation>, ExternalError>;

    async fn update(&self, ctx: &OpContext, mg: &K) -> Result<ExternalUpdate, ExternalError>;

    /// Delete the external resource; an absent resource is success
    async fn delete(&self, ctx: &OpContext, mg: &K) -> Result<(), ExternalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_details_debug_prints_keys_only() {
        let mut details = ConnectionDetails::new();
        details.insert("username", "orders");
        details.insert("password", "pscale_pw_hunter2");
        let debug = format!("{details:?}");
        assert_eq!(debug, r#"{"password", "username"}"#);
        assert_eq!(details.get("username"), Some(b"orders".as_slice()));
        assert_eq!(details.len(), 2);
    }
}
