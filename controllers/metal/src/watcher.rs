//! Kubernetes resource watchers.
//!
//! Each kind runs its own `kube_runtime::Controller`. The runtime handles
//! reconnection and per-object serialization: a key is never reconciled
//! twice at the same time, and events arriving mid-pass queue one more pass.
//!
//! All watchers share the generic [`watch_resource`] helper, which wires the
//! reconciler's requeue policy and metrics into the runtime.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{AddressPool, BaseboardManagement, Cluster, Hardware, Inventory, ObjectReference};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use kube::{Api, Client, Resource};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{watcher, Controller};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Quiet period after the last event before a key is reconciled
const DEBOUNCE: Duration = Duration::from_secs(5);

/// Drive `controller` until its stream ends.
///
/// `reconcile_fn` is one of the reconciler's `reconcile_*` methods; the
/// requeue decision is made here from its result.
async fn watch_resource<K, F>(
    controller: Controller<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    kind: &'static str,
    concurrency: u16,
) -> Result<(), ControllerError>
where
    K: Resource + Clone + Send + Sync + 'static + Debug + DeserializeOwned,
    K::DynamicType: Default + Eq + Hash + Clone + Debug + Unpin,
    F: Fn(Arc<Reconciler>, Arc<K>) -> BoxFuture<'static, Result<(), ControllerError>>
        + Send
        + Sync
        + Clone
        + 'static,
{
    info!("Starting {} watcher", kind);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = ObjectReference::of(obj.as_ref()).to_string();
        ctx.requeue_on_error(kind, &key, error)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            let key = ObjectReference::of(obj.as_ref()).to_string();
            debug!("Reconciling {} {}", kind, key);
            ctx.metrics.reconciled(kind);
            match reconcile_fn(ctx.clone(), obj).await {
                Ok(()) => Ok::<Action, ControllerError>(ctx.requeue_on_success(&key)),
                Err(e) => {
                    ctx.metrics.failed(kind, &e);
                    Err(e)
                }
            }
        }
    };

    let runtime_config = RuntimeConfig::default().debounce(DEBOUNCE).concurrency(concurrency);

    controller
        .with_config(runtime_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!(
                    "{} {}/{} reconciled",
                    kind,
                    obj.namespace.as_deref().unwrap_or(""),
                    obj.name
                ),
                Err(e) => debug!("{} controller event: {}", kind, e),
            }
        })
        .await;

    error!("{} watcher stream ended", kind);
    Err(ControllerError::Watch(format!("{} watcher stream ended", kind)))
}

/// Watches the metal resources and their owned objects.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    client: Client,
    config: ControllerConfig,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("namespace", &self.config.namespace)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Watcher driving `reconciler` against the API server behind `client`
    pub fn new(reconciler: Arc<Reconciler>, client: Client, config: ControllerConfig) -> Self {
        Self {
            reconciler,
            client,
            config,
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.config.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    /// Watches Cluster resources and the Hardware they own.
    pub async fn watch_clusters(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.api::<Cluster>(), watcher::Config::default())
            .owns(self.api::<Hardware>(), watcher::Config::default());
        watch_resource(
            controller,
            self.reconciler.clone(),
            |reconciler, cluster| {
                async move { reconciler.reconcile_cluster(&cluster).await }.boxed()
            },
            "Cluster",
            self.config.concurrency,
        )
        .await
    }

    /// Watches Inventory resources and the BaseboardManagement objects they own.
    pub async fn watch_inventories(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.api::<Inventory>(), watcher::Config::default())
            .owns(self.api::<BaseboardManagement>(), watcher::Config::default());
        watch_resource(
            controller,
            self.reconciler.clone(),
            |reconciler, inventory| {
                async move { reconciler.reconcile_inventory(&inventory).await }.boxed()
            },
            "Inventory",
            self.config.concurrency,
        )
        .await
    }

    /// Watches AddressPool resources.
    pub async fn watch_address_pools(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.api::<AddressPool>(), watcher::Config::default());
        watch_resource(
            controller,
            self.reconciler.clone(),
            |reconciler, pool| {
                async move { reconciler.reconcile_address_pool(&pool).await }.boxed()
            },
            "AddressPool",
            self.config.concurrency,
        )
        .await
    }
}
