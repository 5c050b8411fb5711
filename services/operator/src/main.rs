//! stratus operator
//!
//! Reconciles tenant cluster infrastructure: DNS delegation, the host-setup
//! stack and leftover EBS volumes. Cluster objects are read from
//! `clusters_file` and reconciled against the in-memory cloud until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use stratus_operator::driver::{Driver, DriverConfig};
use stratus_operator::resources;
use stratus_operator::simulation::Fixture;
use stratus_operator::Config;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("loading configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        route53_enabled = config.route53_enabled,
        delegation_ttl_secs = config.delegation_ttl_secs,
        pass_timeout_secs = config.pass_timeout_secs,
        resync_interval_secs = config.resync_interval_secs,
        "Starting stratus operator"
    );

    let path = config
        .clusters_file
        .as_deref()
        .context("clusters_file must be set")?;
    let fixture = Fixture::load(path)
        .with_context(|| format!("reading clusters file {}", path.display()))?;

    // Create the cloud (in-memory for now)
    let cloud = Arc::new(fixture.seed(&config)?);

    let set = resources::default_set(&config, cloud.clone(), cloud)?;
    info!(resources = ?set.names(), "Resource set assembled");

    let driver = Arc::new(Driver::new(set, DriverConfig::from_config(&config)));

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = driver.spawn(fixture.clusters, shutdown_rx).await;
    info!(clusters = handles.len(), "Reconciling clusters");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Received shutdown signal");

    // Signal shutdown to all workers
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Cluster task panicked");
        }
    }

    for (cluster_id, status) in driver.statuses().await {
        info!(%cluster_id, ?status, "Final cluster status");
    }

    info!("Operator shutdown complete");
    Ok(())
}
