//! Metal Controller
//!
//! Bare-metal provisioning controller for three CRDs:
//! - AddressPool: IPv4 ranges handed out to clusters and nodes
//! - Inventory: one physical machine and its BMC
//! - Cluster: a set of Inventory nodes joined under one virtual address
//!
//! Reconciliation is level-triggered; every step is persisted before the
//! next one runs so an interrupted pass resumes where it stopped.

mod allocator;
mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting metal controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Resync interval: {:?}", config.resync_interval);
    info!("  Store timeout: {:?}", config.store_timeout);
    info!("  Not-ready requeue: {:?}", config.not_ready_requeue);
    info!("  Concurrency: {}", config.concurrency);
    info!("  Metrics address: {}", config.metrics_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
