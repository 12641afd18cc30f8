//! # Initialization
//!
//! Controller initialization: tracing, rustls, metrics, the HTTP server, the
//! shutdown token and the Kubernetes client.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use kube::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::server::{start_server, ServerState};
use crate::observability;

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub config: ControllerConfig,
    /// Server state for health checks
    pub server_state: ServerState,
    /// Cancelled on SIGINT/SIGTERM; aborts in-flight calls
    pub shutdown: CancellationToken,
    pub server_handle: JoinHandle<()>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("config", &self.config)
            .field("server_state", &self.server_state)
            .finish_non_exhaustive()
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over the default filter; `debug` raises the default to debug.
pub fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "provider_planetscale=debug"
    } else {
        "provider_planetscale=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

/// Initialize the controller runtime
///
/// Tracing must already be installed.
pub async fn initialize(
    config: ControllerConfig,
    server_config: &ServerConfig,
) -> Result<InitializationResult> {
    // Required for rustls 0.23+ when several providers are compiled in
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    info!("Starting provider-planetscale v{}", env!("CARGO_PKG_VERSION"));
    info!(
        poll_interval_secs = config.poll_interval.as_secs(),
        max_concurrent_reconciles = config.max_concurrent_reconciles,
        global_rate_per_sec = config.global_rate_per_sec,
        api_url = %config.planetscale_api_url,
        "Controller configuration"
    );

    observability::metrics::register_metrics()?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let server_state = ServerState::new();
    let server_handle = {
        let state = server_state.clone();
        let port = server_config.metrics_port;
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state, shutdown).await {
                error!("HTTP server error: {:#}", e);
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle, server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    info!("Controller initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        config,
        server_state,
        shutdown,
        server_handle,
    })
}

/// Cancel `shutdown` on SIGINT or SIGTERM
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received, cancelling in-flight operations");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM, only SIGINT will stop the controller");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Wait for the HTTP server to bind
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(server_config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(server_config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state
            .is_bound
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}
