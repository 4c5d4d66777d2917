//! Main controller implementation.
//!
//! The `Controller` struct wires the store client, reconciler, watchers and
//! the metrics endpoint together. It manages three CRD types:
//! - AddressPool: validated and published as ready
//! - Inventory: BMC object creation and phase tracking
//! - Cluster: address allocation, node binding and hardware handoff

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::{self, Metrics};
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use kube::Client;
use std::sync::Arc;
use store_client::KubeStoreClient;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Main controller for the metal resources.
#[derive(Debug)]
pub struct Controller {
    cluster_watcher: JoinHandle<Result<(), ControllerError>>,
    inventory_watcher: JoinHandle<Result<(), ControllerError>>,
    address_pool_watcher: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its watchers.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing metal controller");

        let kube_client = Client::try_default().await?;

        let metrics = Metrics::new().map_err(|e| {
            ControllerError::InvalidConfig(format!("failed to register metrics: {}", e))
        })?;
        let store = KubeStoreClient::new(kube_client.clone(), config.store_timeout);
        let reconciler = Reconciler::new(Box::new(store), config.clone(), metrics.clone());

        info!("Releasing inventories bound to deleted clusters...");
        match reconciler.release_orphaned_inventories().await {
            Ok(count) => info!("Startup sweep released {} inventories", count),
            Err(e) => warn!("Startup sweep failed (will continue): {}", e),
        }
        let reconciler = Arc::new(reconciler);

        let watcher_instance = Arc::new(Watcher::new(reconciler, kube_client, config.clone()));

        let cluster_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_clusters().await })
        };
        let inventory_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_inventories().await })
        };
        let address_pool_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_address_pools().await })
        };
        let metrics_server = tokio::spawn(metrics::serve(config.metrics_addr, metrics));

        Ok(Self {
            cluster_watcher,
            inventory_watcher,
            address_pool_watcher,
            metrics_server,
        })
    }

    /// Runs until a watcher or the metrics server exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Metal controller running");

        let result = tokio::select! {
            result = &mut self.cluster_watcher => flatten("Cluster watcher", result),
            result = &mut self.inventory_watcher => flatten("Inventory watcher", result),
            result = &mut self.address_pool_watcher => flatten("AddressPool watcher", result),
            result = &mut self.metrics_server => flatten("Metrics server", result),
        };

        if let Err(e) = &result {
            error!("Metal controller stopping: {}", e);
        }
        self.cluster_watcher.abort();
        self.inventory_watcher.abort();
        self.address_pool_watcher.abort();
        self.metrics_server.abort();
        result
    }
}

fn flatten(
    task: &str,
    result: Result<Result<(), ControllerError>, tokio::task::JoinError>,
) -> Result<(), ControllerError> {
    result
        .map_err(|e| ControllerError::Watch(format!("{} panicked: {}", task, e)))?
        .map_err(|e| ControllerError::Watch(format!("{} error: {}", task, e)))
}
