//! # provider-planetscale
//!
//! Operator binary: reconciles PlanetScale `Database` and `Password` resources
//! and tracks ProviderConfig usage.
//!
//! Configuration comes from environment variables (see `config`); the flags
//! below override them.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;

use provider_planetscale::config::{load_config, ControllerConfig, ServerConfig};
use provider_planetscale::runtime::{init_tracing, initialize, run_watch_loop};

#[derive(Debug, Parser)]
#[command(name = "provider-planetscale", version, about)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Steady-state poll interval in seconds
    #[arg(long)]
    poll_interval_secs: Option<u64>,

    /// Global reconcile rate across all kinds (passes per second)
    #[arg(long)]
    max_reconcile_rate: Option<u32>,

    /// Maximum concurrent reconciliations per resource kind
    #[arg(long)]
    max_concurrent_reconciles: Option<u16>,

    /// Port for metrics and health probes
    #[arg(long)]
    metrics_port: Option<u16>,
}

impl Args {
    fn apply(&self, config: &mut ControllerConfig, server: &mut ServerConfig) {
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(rate) = self.max_reconcile_rate {
            config.global_rate_per_sec = rate;
        }
        if let Some(concurrency) = self.max_concurrent_reconciles {
            config.max_concurrent_reconciles = concurrency;
        }
        if let Some(port) = self.metrics_port {
            server.metrics_port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let (mut config, mut server_config) = load_config();
    args.apply(&mut config, &mut server_config);

    let init_result = initialize(config, &server_config).await?;
    run_watch_loop(init_result).await
}
