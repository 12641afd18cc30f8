//! # Watch Loop
//!
//! Builds one kube-runtime controller per resource kind and runs them until
//! shutdown. Managed kinds share the ProviderConfig plumbing, the credential
//! resolver, the service factory and the global rate limiter.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use kube::{Api, Client};
use kube_runtime::controller::{Config as ControllerRunConfig, Controller};
use kube_runtime::watcher::Config as WatcherConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::error_policy::{error_policy, log_reconcile_result};
use super::initialization::InitializationResult;
use crate::config::ControllerConfig;
use crate::constants::WATCH_TIMEOUT_SECS;
use crate::controller::connector::{PlanetScaleResource, ProviderConnector};
use crate::controller::credentials::{
    CommonCredentialResolver, CredentialResolver, PlanetScaleServiceFactory, ServiceFactory,
};
use crate::controller::providerconfig::{self, ProviderConfigReconciler};
use crate::controller::publisher::SecretPublisher;
use crate::controller::reconciler::{
    reconcile, GlobalRateLimiter, ManagedReconciler, RateLimiterConfig, ReconcilerConfig,
};
use crate::controller::store::kubernetes::{
    KubeProviderConfigStore, KubeResourceStore, KubeSecretSource,
};
use crate::controller::store::ProviderConfigStore;
use crate::crd::{Database, Password, ProviderConfig, ProviderConfigUsage};

type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Dependencies shared by every managed controller
struct Shared {
    client: Client,
    config: ControllerConfig,
    provider_configs: Arc<dyn ProviderConfigStore>,
    credentials: Arc<dyn CredentialResolver>,
    services: Arc<dyn ServiceFactory>,
    limiter: Arc<GlobalRateLimiter>,
    shutdown: CancellationToken,
}

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Controller for one managed resource kind
fn managed_controller<K: PlanetScaleResource>(shared: &Shared) -> ControllerFuture {
    let client = shared.client.clone();
    let reconciler = Arc::new(ManagedReconciler::<K>::new(
        Arc::new(KubeResourceStore::<K>::new(client.clone())),
        Arc::new(ProviderConnector::<K>::new(
            Arc::clone(&shared.provider_configs),
            Arc::clone(&shared.credentials),
            Arc::clone(&shared.services),
        )),
        Arc::new(SecretPublisher::<K>::new(client.clone())),
        Arc::clone(&shared.limiter),
        ReconcilerConfig::from(&shared.config),
        shared.shutdown.clone(),
    ));
    let kind = K::kind(&()).into_owned();

    Box::pin(
        Controller::new(Api::<K>::all(client), watcher_config())
            .with_config(
                ControllerRunConfig::default().concurrency(shared.config.max_concurrent_reconciles),
            )
            .shutdown_on_signal()
            .run(reconcile::<K>, error_policy::<K>, reconciler)
            .for_each(log_reconcile_result(kind)),
    )
}

/// Controller counting ProviderConfig users
fn provider_config_controller(client: &Client) -> ControllerFuture {
    let ctx = Arc::new(ProviderConfigReconciler::new(client.clone()));
    Box::pin(
        Controller::new(Api::<ProviderConfig>::all(client.clone()), watcher_config())
            .watches(
                Api::<ProviderConfigUsage>::all(client.clone()),
                watcher_config(),
                |usage| providerconfig::usage_owner(&usage),
            )
            .shutdown_on_signal()
            .run(providerconfig::reconcile, providerconfig::error_policy, ctx)
            .for_each(log_reconcile_result("ProviderConfig".to_string())),
    )
}

/// Run all controllers until a shutdown signal
pub async fn run_watch_loop(init: InitializationResult) -> Result<()> {
    let InitializationResult {
        client,
        config,
        server_state,
        shutdown,
        server_handle,
    } = init;

    let shared = Shared {
        provider_configs: Arc::new(KubeProviderConfigStore::new(client.clone())),
        credentials: Arc::new(CommonCredentialResolver::new(Arc::new(
            KubeSecretSource::new(client.clone()),
        ))),
        services: Arc::new(PlanetScaleServiceFactory::new(
            config.planetscale_api_url.clone(),
            config.http_timeout,
        )),
        limiter: Arc::new(GlobalRateLimiter::new(RateLimiterConfig::from(&config))),
        client,
        config,
        shutdown: shutdown.clone(),
    };

    info!("Starting controllers: Database, Password, ProviderConfig");
    let controllers = vec![
        managed_controller::<Database>(&shared),
        managed_controller::<Password>(&shared),
        provider_config_controller(&shared.client),
    ];
    server_state.set_ready(true);

    futures::future::join_all(controllers).await;

    server_state.set_ready(false);
    shutdown.cancel();
    if let Err(e) = server_handle.await {
        tracing::warn!(error = %e, "HTTP server task ended abnormally");
    }
    info!("provider-planetscale shut down");
    Ok(())
}
