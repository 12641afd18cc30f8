//! # Credentials
//!
//! Resolves the PlanetScale service token named by a ProviderConfig and turns
//! it into an API handle.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use zeroize::Zeroizing;

use super::context::{Interrupted, OpContext};
use super::store::{SecretSource, StoreError};
use crate::crd::{CredentialsSource, ProviderCredentials};
use crate::provider::planetscale::{ApiError, PlanetScaleApi, PlanetScaleClient};

/// Errors resolving credential bytes
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credentials source {0} is not supported")]
    UnsupportedSource(CredentialsSource),

    #[error("credentials source {kind} requires {field}")]
    MissingSelector {
        kind: CredentialsSource,
        field: &'static str,
    },

    #[error("cannot read credentials secret: {0}")]
    Secret(#[source] StoreError),

    #[error("key {key} not found in secret {namespace}/{name}")]
    MissingKey {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("environment variable {0} is not set or not valid UTF-8")]
    MissingEnv(String),

    #[error("cannot read credentials file {path}: {error}")]
    File {
        path: String,
        #[source]
        error: std::io::Error,
    },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Resolves credential bytes from a ProviderConfig credentials block
#[async_trait]
pub trait CredentialResolver: Send + Sync + Debug {
    async fn resolve(
        &self,
        ctx: &OpContext,
        credentials: &ProviderCredentials,
    ) -> Result<Zeroizing<Vec<u8>>, CredentialError>;
}

/// Resolver for the Secret, Environment and Filesystem sources
#[derive(Debug, Clone)]
pub struct CommonCredentialResolver {
    secrets: Arc<dyn SecretSource>,
}

impl CommonCredentialResolver {
    pub fn new(secrets: Arc<dyn SecretSource>) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl CredentialResolver for CommonCredentialResolver {
    async fn resolve(
        &self,
        ctx: &OpContext,
        credentials: &ProviderCredentials,
    ) -> Result<Zeroizing<Vec<u8>>, CredentialError> {
        let source = credentials.source;
        match source {
            CredentialsSource::Secret => {
                let selector =
                    credentials
                        .secret_ref
                        .as_ref()
                        .ok_or(CredentialError::MissingSelector {
                            kind: source,
                            field: "secretRef",
                        })?;
                let value = ctx
                    .run(async {
                        self.secrets
                            .get_secret_key(&selector.namespace, &selector.name, &selector.key)
                            .await
                            .map_err(CredentialError::Secret)
                    })
                    .await?;
                value
                    .map(Zeroizing::new)
                    .ok_or_else(|| CredentialError::MissingKey {
                        namespace: selector.namespace.clone(),
                        name: selector.name.clone(),
                        key: selector.key.clone(),
                    })
            }
            CredentialsSource::Environment => {
                let selector = credentials
                    .env
                    .as_ref()
                    .ok_or(CredentialError::MissingSelector {
                        kind: source,
                        field: "env",
                    })?;
                std::env::var(&selector.name)
                    .map(|value| Zeroizing::new(value.into_bytes()))
                    .map_err(|_err| CredentialError::MissingEnv(selector.name.clone()))
            }
            CredentialsSource::Filesystem => {
                let selector = credentials
                    .fs
                    .as_ref()
                    .ok_or(CredentialError::MissingSelector {
                        kind: source,
                        field: "fs",
                    })?;
                ctx.run(async {
                    tokio::fs::read(&selector.path)
                        .await
                        .map(Zeroizing::new)
                        .map_err(|error| CredentialError::File {
                            path: selector.path.clone(),
                            error,
                        })
                })
                .await
            }
            CredentialsSource::None => Err(CredentialError::UnsupportedSource(source)),
        }
    }
}

/// Errors building an API handle from credentials
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("credentials are empty")]
    EmptyCredentials,

    #[error("credentials are not valid UTF-8")]
    NotUtf8,

    #[error("cannot build PlanetScale client: {0}")]
    Client(#[source] ApiError),
}

/// Parse a service token out of raw credential bytes
pub fn parse_token(credentials: &[u8]) -> Result<&str, ServiceError> {
    let token = std::str::from_utf8(credentials)
        .map_err(|_err| ServiceError::NotUtf8)?
        .trim();
    if token.is_empty() {
        return Err(ServiceError::EmptyCredentials);
    }
    Ok(token)
}

/// Builds a PlanetScale API handle from credential bytes
pub trait ServiceFactory: Send + Sync + Debug {
    fn new_service(&self, credentials: &[u8]) -> Result<Arc<dyn PlanetScaleApi>, ServiceError>;
}

/// Factory for the REST client
#[derive(Debug, Clone)]
pub struct PlanetScaleServiceFactory {
    base_url: String,
    timeout: Duration,
}

impl PlanetScaleServiceFactory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

impl ServiceFactory for PlanetScaleServiceFactory {
    fn new_service(&self, credentials: &[u8]) -> Result<Arc<dyn PlanetScaleApi>, ServiceError> {
        let token = parse_token(credentials)?;
        let client = PlanetScaleClient::new(&self.base_url, token, self.timeout)
            .map_err(ServiceError::Client)?;
        Ok(Arc::new(client))
    }
}

/// Factory that hands out one shared API handle after validating the credentials
#[derive(Debug, Clone)]
pub struct StaticServiceFactory {
    api: Arc<dyn PlanetScaleApi>,
}

impl StaticServiceFactory {
    pub fn new(api: Arc<dyn PlanetScaleApi>) -> Self {
        Self { api }
    }
}

impl ServiceFactory for StaticServiceFactory {
    fn new_service(&self, credentials: &[u8]) -> Result<Arc<dyn PlanetScaleApi>, ServiceError> {
        parse_token(credentials)?;
        Ok(Arc::clone(&self.api))
    }
}
