//! # Connector
//!
//! Resolves a managed resource to an external client:
//! usage tracking, ProviderConfig lookup, credential resolution, service
//! construction. Nothing here touches PlanetScale itself.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use super::context::OpContext;
use super::credentials::{CredentialError, CredentialResolver, ServiceError, ServiceFactory};
use super::external::{ExternalClient, ExternalConnector};
use super::store::{ProviderConfigStore, StoreError, UsageRef};
use crate::crd::Managed;
use crate::provider::planetscale::PlanetScaleApi;

/// Step of `connect` that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    TrackUsage,
    GetProviderConfig,
    GetCredentials,
    NewService,
}

/// Connect failure tagged with its stage
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("cannot track ProviderConfig usage: {0}")]
    TrackUsage(#[source] StoreError),

    #[error("cannot get ProviderConfig: {0}")]
    GetProviderConfig(#[source] StoreError),

    #[error("cannot get credentials: {0}")]
    GetCredentials(#[source] CredentialError),

    #[error("cannot create new service: {0}")]
    NewService(#[source] ServiceError),
}

impl ConnectError {
    pub fn stage(&self) -> ConnectStage {
        match self {
            Self::TrackUsage(_) => ConnectStage::TrackUsage,
            Self::GetProviderConfig(_) => ConnectStage::GetProviderConfig,
            Self::GetCredentials(_) => ConnectStage::GetCredentials,
            Self::NewService(_) => ConnectStage::NewService,
        }
    }
}

/// A managed resource kind backed by the PlanetScale API
pub trait PlanetScaleResource: Managed {
    fn external_client(api: Arc<dyn PlanetScaleApi>) -> Box<dyn ExternalClient<Self>>;
}

/// Connector shared by every PlanetScale kind
pub struct ProviderConnector<K> {
    provider_configs: Arc<dyn ProviderConfigStore>,
    credentials: Arc<dyn CredentialResolver>,
    services: Arc<dyn ServiceFactory>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> ProviderConnector<K> {
    pub fn new(
        provider_configs: Arc<dyn ProviderConfigStore>,
        credentials: Arc<dyn CredentialResolver>,
        services: Arc<dyn ServiceFactory>,
    ) -> Self {
        Self {
            provider_configs,
            credentials,
            services,
            _kind: PhantomData,
        }
    }
}

impl<K> fmt::Debug for ProviderConnector<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConnector")
            .field("provider_configs", &self.provider_configs)
            .field("credentials", &self.credentials)
            .field("services", &self.services)
            .finish()
    }
}

#[async_trait]
impl<K: PlanetScaleResource> ExternalConnector<K> for ProviderConnector<K> {
    async fn connect(
        &self,
        ctx: &OpContext,
        mg: &K,
    ) -> Result<Box<dyn ExternalClient<K>>, ConnectError> {
        let usage = UsageRef::for_resource(mg);
        ctx.run(self.provider_configs.track_usage(&usage))
            .await
            .map_err(ConnectError::TrackUsage)?;

        let provider_config = ctx
            .run(
                self.provider_configs
                    .get_provider_config(mg.provider_config_name()),
            )
            .await
            .map_err(ConnectError::GetProviderConfig)?;

        let credentials = self
            .credentials
            .resolve(ctx, &provider_config.spec.credentials)
            .await
            .map_err(ConnectError::GetCredentials)?;

        let api = self
            .services
            .new_service(&credentials)
            .map_err(ConnectError::NewService)?;

        debug!(
            provider_config = %usage.provider_config,
            source = %provider_config.spec.credentials.source,
            "Connected to PlanetScale"
        );
        Ok(K::external_client(api))
    }
}
