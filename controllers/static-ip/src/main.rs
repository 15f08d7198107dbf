//! Static IP Controller
//!
//! Assigns static IP addresses to Cluster API vSphere resources:
//! - VSphereMachine: every non-DHCP network device gets an address
//! - HAProxyLoadBalancer: the load balancer VM device gets an address
//! - VSphereCluster: the control plane endpoint host, when no load balancer fronts it
//!
//! Addresses are claimed from a pluggable IPAM backend (metal3 by default)
//! and written back with merge patches.

mod backoff;
mod config;
mod controller;
mod error;
mod patch;
mod reconciler;
mod store;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // kube is built on rustls without a default crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| ControllerError::InvalidConfig("failed to install rustls crypto provider".to_string()))?;

    info!("Starting Static IP Controller");

    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  IPAM type: {}", config.ipam_type);
    info!("  Sync period: {:?}", config.sync_period);
    info!("  Pending requeue: {:?}", config.pending_requeue);
    info!("  Max concurrent reconciles: {}", config.max_concurrent_reconciles);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
