//! Reconciliation logic for the metal CRDs.
//!
//! - `address_pool`: validates pools and publishes their resolved range
//! - `inventory`: BMC object handling, phase promotion and finalizer
//! - `cluster`: the three-phase cluster state machine and ordered teardown
//! - `hardware`: hardware descriptor generation for the provisioning engine
//!
//! Every pass re-reads the object from the store before acting and persists
//! each step before moving to the next, so an interrupted pass resumes from
//! the last recorded step.

pub mod address_pool;
pub mod cluster;
pub mod hardware;
pub mod inventory;

#[cfg(test)]
mod address_pool_test;

use crate::backoff::BackoffTracker;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crds::ObjectReference;
use kube::Resource;
use kube_runtime::controller::Action;
use store_client::StoreClientTrait;
use tracing::{error, info, warn};

/// Reconciles Inventory, AddressPool and Cluster resources.
pub struct Reconciler {
    pub(crate) store: Box<dyn StoreClientTrait + Send + Sync>,
    pub(crate) config: ControllerConfig,
    pub(crate) metrics: Metrics,
    /// Hard-failure backoff per resource (namespace/name)
    backoff: BackoffTracker,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        store: Box<dyn StoreClientTrait + Send + Sync>,
        config: ControllerConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            config,
            metrics,
            backoff: BackoffTracker::default(),
        }
    }

    /// Requeue decision after a successful pass
    pub fn requeue_on_success(&self, key: &str) -> Action {
        self.backoff.reset(key);
        Action::requeue(self.config.resync_interval)
    }

    /// Requeue decision after a failed pass
    ///
    /// Waiting on a dependency and version conflicts use fixed short delays;
    /// everything else goes through the per-resource Fibonacci backoff.
    pub fn requeue_on_error(&self, kind: &str, key: &str, err: &ControllerError) -> Action {
        if let Some(delay) = err.requeue_after(self.config.not_ready_requeue) {
            if matches!(err, ControllerError::Conflict(_)) {
                warn!("{} {} hit a write conflict, retrying in {:?}: {}", kind, key, delay, err);
            } else {
                info!("{} {} waiting, retrying in {:?}: {}", kind, key, delay, err);
            }
            return Action::requeue(delay);
        }
        let (delay, errors) = self.backoff.record_failure(key);
        error!(
            "Reconciliation of {} {} failed ({} consecutive), retrying in {:?}: {}",
            kind, key, errors, delay, err
        );
        Action::requeue(delay)
    }
}

/// Namespace-qualified key of a stored object
pub(crate) fn object_key<K: Resource>(
    obj: &K,
    kind: &str,
) -> Result<ObjectReference, ControllerError> {
    let name = obj
        .meta()
        .name
        .as_ref()
        .ok_or_else(|| ControllerError::InvalidConfig(format!("{} missing name", kind)))?;
    let namespace = obj.meta().namespace.as_deref().unwrap_or("default");
    Ok(ObjectReference::new(namespace, name.as_str()))
}

/// Random secret for cluster tokens and provisioning passwords
pub(crate) fn generate_secret() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Whether `finalizer` is present on `obj`
pub(crate) fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Add `finalizer`; returns false when already present
pub(crate) fn add_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    if has_finalizer(obj, finalizer) {
        return false;
    }
    obj.meta_mut()
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    true
}

/// Remove `finalizer`; returns false when it was absent
pub(crate) fn remove_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    if !has_finalizer(obj, finalizer) {
        return false;
    }
    if let Some(finalizers) = obj.meta_mut().finalizers.as_mut() {
        finalizers.retain(|x| x != finalizer);
    }
    true
}
