//! Mock StoreClient for unit testing
//!
//! This module provides an in-memory implementation of StoreClientTrait that
//! behaves like the API server where the reconcilers care:
//!
//! - every successful write bumps `metadata.resourceVersion`
//! - a write carrying a stale resource version fails with `Conflict`
//! - metadata/spec updates keep the stored status and status updates keep
//!   the stored metadata/spec
//! - deleting an object with finalizers only marks it for deletion; it goes
//!   away once the last finalizer is removed
//!
//! Failures can be queued per operation with [`MockStoreClient::fail_next`].

use crate::error::StoreError;
use crate::store_trait::StoreClientTrait;
use crds::{
    AddressPool, AddressPoolStatus, BaseboardManagement, BaseboardManagementStatus, Cluster,
    ClusterStatus, Hardware, HardwareStatus, Inventory, InventoryStatus, ObjectReference,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Resource, ResourceExt};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct State {
    inventories: BTreeMap<ObjectReference, Inventory>,
    address_pools: BTreeMap<ObjectReference, AddressPool>,
    clusters: BTreeMap<ObjectReference, Cluster>,
    hardware: BTreeMap<ObjectReference, Hardware>,
    baseboards: BTreeMap<ObjectReference, BaseboardManagement>,
    resource_version: u64,
    failures: HashMap<String, VecDeque<StoreError>>,
    writes: HashMap<String, usize>,
}

impl State {
    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

/// Object kinds held by the mock store
trait Stored: Resource<DynamicType = ()> + Clone + Send + 'static {
    const KIND: &'static str;
    type Status: Clone;

    fn status_slot(&mut self) -> &mut Option<Self::Status>;
    fn table(state: &mut State) -> &mut BTreeMap<ObjectReference, Self>;
}

macro_rules! stored {
    ($ty:ty, $kind:literal, $table:ident, $status:ty) => {
        impl Stored for $ty {
            const KIND: &'static str = $kind;
            type Status = $status;

            fn status_slot(&mut self) -> &mut Option<$status> {
                &mut self.status
            }

            fn table(state: &mut State) -> &mut BTreeMap<ObjectReference, Self> {
                &mut state.$table
            }
        }
    };
}

stored!(Inventory, "Inventory", inventories, InventoryStatus);
stored!(AddressPool, "AddressPool", address_pools, AddressPoolStatus);
stored!(Cluster, "Cluster", clusters, ClusterStatus);
stored!(Hardware, "Hardware", hardware, HardwareStatus);
stored!(BaseboardManagement, "BaseboardManagement", baseboards, BaseboardManagementStatus);

fn deletion_time() -> Option<Time> {
    serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).ok()
}

fn key_of<K: Stored>(obj: &K) -> Result<ObjectReference, StoreError> {
    match (obj.meta().namespace.as_deref(), obj.meta().name.as_deref()) {
        (Some(namespace), Some(name)) => Ok(ObjectReference::new(namespace, name)),
        _ => Err(StoreError::InvalidObject(format!(
            "{} is missing name or namespace",
            K::KIND
        ))),
    }
}

/// Stamp resource version and, like the API server on create, a uid
fn assign_identity<K: Stored>(obj: &mut K, rv: String) {
    if obj.meta().uid.is_none() {
        obj.meta_mut().uid = Some(format!("uid-{}", rv));
    }
    obj.meta_mut().resource_version = Some(rv);
}

/// In-memory store for testing
#[derive(Clone, Default)]
pub struct MockStoreClient {
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for MockStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStoreClient").finish_non_exhaustive()
    }
}

impl MockStoreClient {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call of `op` (a trait method name) fail with `err`
    pub fn fail_next(&self, op: &str, err: StoreError) {
        self.state()
            .failures
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    /// Number of successful calls of the write operation `op`
    pub fn write_count(&self, op: &str) -> usize {
        self.state().writes.get(op).copied().unwrap_or(0)
    }

    fn take_failure(state: &mut State, op: &str) -> Result<(), StoreError> {
        match state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn record_write(state: &mut State, op: &str) {
        *state.writes.entry(op.to_string()).or_insert(0) += 1;
    }

    fn insert<K: Stored>(&self, mut obj: K) {
        let mut state = self.state();
        let Ok(key) = key_of(&obj) else {
            return;
        };
        let rv = state.next_resource_version();
        assign_identity(&mut obj, rv);
        K::table(&mut state).insert(key, obj);
    }

    fn lookup<K: Stored>(&self, key: &ObjectReference) -> Option<K> {
        K::table(&mut self.state()).get(key).cloned()
    }

    fn mark_deleted<K: Stored>(&self, key: &ObjectReference) {
        let mut state = self.state();
        let rv = state.next_resource_version();
        let table = K::table(&mut state);
        let Some(obj) = table.get_mut(key) else {
            return;
        };
        if obj.finalizers().is_empty() {
            table.remove(key);
            return;
        }
        obj.meta_mut().deletion_timestamp = deletion_time();
        obj.meta_mut().resource_version = Some(rv);
    }

    fn get_obj<K: Stored>(&self, op: &str, key: &ObjectReference) -> Result<K, StoreError> {
        let mut state = self.state();
        Self::take_failure(&mut state, op)?;
        K::table(&mut state)
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", K::KIND, key)))
    }

    fn create_obj<K: Stored>(&self, op: &str, obj: &K) -> Result<K, StoreError> {
        let mut state = self.state();
        Self::take_failure(&mut state, op)?;
        let key = key_of(obj)?;
        if K::table(&mut state).contains_key(&key) {
            return Err(StoreError::Conflict(format!("{} {} already exists", K::KIND, key)));
        }
        let mut created = obj.clone();
        let rv = state.next_resource_version();
        assign_identity(&mut created, rv);
        K::table(&mut state).insert(key, created.clone());
        Self::record_write(&mut state, op);
        Ok(created)
    }

    fn write_obj<K: Stored>(&self, op: &str, obj: &K, status_only: bool) -> Result<K, StoreError> {
        let mut state = self.state();
        Self::take_failure(&mut state, op)?;
        let key = key_of(obj)?;
        let rv = state.next_resource_version();
        let table = K::table(&mut state);
        let existing = table
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", K::KIND, key)))?;

        if let Some(expected) = obj.resource_version() {
            if existing.resource_version().as_deref() != Some(expected.as_str()) {
                return Err(StoreError::Conflict(format!(
                    "{} {}: resourceVersion {} is stale",
                    K::KIND,
                    key,
                    expected
                )));
            }
        }

        let mut updated = if status_only {
            let mut next = existing.clone();
            *next.status_slot() = obj.clone().status_slot().clone();
            next
        } else {
            let mut next = obj.clone();
            *next.status_slot() = existing.clone().status_slot().clone();
            next.meta_mut().deletion_timestamp = existing.meta().deletion_timestamp.clone();
            next
        };
        updated.meta_mut().resource_version = Some(rv);

        if updated.meta().deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            table.remove(&key);
        } else {
            table.insert(key, updated.clone());
        }
        Self::record_write(&mut state, op);
        Ok(updated)
    }

    fn delete_obj<K: Stored>(&self, op: &str, key: &ObjectReference) -> Result<(), StoreError> {
        {
            let mut state = self.state();
            Self::take_failure(&mut state, op)?;
            if !K::table(&mut state).contains_key(key) {
                return Err(StoreError::NotFound(format!("{} {}", K::KIND, key)));
            }
            Self::record_write(&mut state, op);
        }
        self.mark_deleted::<K>(key);
        Ok(())
    }

    /// Seed an Inventory (for test setup)
    pub fn insert_inventory(&self, inventory: Inventory) {
        self.insert(inventory);
    }

    /// Seed an AddressPool (for test setup)
    pub fn insert_address_pool(&self, pool: AddressPool) {
        self.insert(pool);
    }

    /// Seed a Cluster (for test setup)
    pub fn insert_cluster(&self, cluster: Cluster) {
        self.insert(cluster);
    }

    /// Seed a Hardware descriptor (for test setup)
    pub fn insert_hardware(&self, hardware: Hardware) {
        self.insert(hardware);
    }

    /// Seed a BaseboardManagement object (for test setup)
    pub fn insert_baseboard(&self, baseboard: BaseboardManagement) {
        self.insert(baseboard);
    }

    /// Simulate the BMC collaborator reporting status
    pub fn set_baseboard_status(&self, key: &ObjectReference, status: BaseboardManagementStatus) {
        let mut state = self.state();
        let rv = state.next_resource_version();
        if let Some(bmc) = state.baseboards.get_mut(key) {
            bmc.status = Some(status);
            bmc.meta_mut().resource_version = Some(rv);
        }
    }

    /// Stored Inventory, if any
    pub fn inventory(&self, key: &ObjectReference) -> Option<Inventory> {
        self.lookup(key)
    }

    /// Stored AddressPool, if any
    pub fn address_pool(&self, key: &ObjectReference) -> Option<AddressPool> {
        self.lookup(key)
    }

    /// Stored Cluster, if any
    pub fn cluster(&self, key: &ObjectReference) -> Option<Cluster> {
        self.lookup(key)
    }

    /// Stored Hardware descriptor, if any
    pub fn hardware(&self, key: &ObjectReference) -> Option<Hardware> {
        self.lookup(key)
    }

    /// Stored BaseboardManagement object, if any
    pub fn baseboard(&self, key: &ObjectReference) -> Option<BaseboardManagement> {
        self.lookup(key)
    }

    /// Number of stored Hardware descriptors
    pub fn hardware_count(&self) -> usize {
        self.state().hardware.len()
    }

    /// Request deletion of a Cluster, as `kubectl delete` would
    pub fn mark_cluster_for_deletion(&self, key: &ObjectReference) {
        self.mark_deleted::<Cluster>(key);
    }

    /// Request deletion of an Inventory, as `kubectl delete` would
    pub fn mark_inventory_for_deletion(&self, key: &ObjectReference) {
        self.mark_deleted::<Inventory>(key);
    }
}

#[async_trait::async_trait]
impl StoreClientTrait for MockStoreClient {
    async fn get_inventory(&self, key: &ObjectReference) -> Result<Inventory, StoreError> {
        self.get_obj("get_inventory", key)
    }

    async fn list_inventories(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<Inventory>, StoreError> {
        let mut state = self.state();
        Self::take_failure(&mut state, "list_inventories")?;
        Ok(state
            .inventories
            .iter()
            .filter(|(key, _)| namespace.is_none_or(|ns| key.namespace == ns))
            .map(|(_, inventory)| inventory.clone())
            .collect())
    }

    async fn update_inventory(&self, inventory: &Inventory) -> Result<Inventory, StoreError> {
        self.write_obj("update_inventory", inventory, false)
    }

    async fn update_inventory_status(
        &self,
        inventory: &Inventory,
    ) -> Result<Inventory, StoreError> {
        self.write_obj("update_inventory_status", inventory, true)
    }

    async fn get_address_pool(&self, key: &ObjectReference) -> Result<AddressPool, StoreError> {
        self.get_obj("get_address_pool", key)
    }

    async fn list_address_pools(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<AddressPool>, StoreError> {
        let mut state = self.state();
        Self::take_failure(&mut state, "list_address_pools")?;
        Ok(state
            .address_pools
            .iter()
            .filter(|(key, _)| namespace.is_none_or(|ns| key.namespace == ns))
            .map(|(_, pool)| pool.clone())
            .collect())
    }

    async fn update_address_pool_status(
        &self,
        pool: &AddressPool,
    ) -> Result<AddressPool, StoreError> {
        self.write_obj("update_address_pool_status", pool, true)
    }

    async fn get_cluster(&self, key: &ObjectReference) -> Result<Cluster, StoreError> {
        self.get_obj("get_cluster", key)
    }

    async fn update_cluster(&self, cluster: &Cluster) -> Result<Cluster, StoreError> {
        self.write_obj("update_cluster", cluster, false)
    }

    async fn update_cluster_status(&self, cluster: &Cluster) -> Result<Cluster, StoreError> {
        self.write_obj("update_cluster_status", cluster, true)
    }

    async fn get_hardware(&self, key: &ObjectReference) -> Result<Hardware, StoreError> {
        self.get_obj("get_hardware", key)
    }

    async fn create_hardware(&self, hardware: &Hardware) -> Result<Hardware, StoreError> {
        self.create_obj("create_hardware", hardware)
    }

    async fn update_hardware(&self, hardware: &Hardware) -> Result<Hardware, StoreError> {
        self.write_obj("update_hardware", hardware, false)
    }

    async fn delete_hardware(&self, key: &ObjectReference) -> Result<(), StoreError> {
        self.delete_obj::<Hardware>("delete_hardware", key)
    }

    async fn get_baseboard(
        &self,
        key: &ObjectReference,
    ) -> Result<BaseboardManagement, StoreError> {
        self.get_obj("get_baseboard", key)
    }

    async fn create_baseboard(
        &self,
        baseboard: &BaseboardManagement,
    ) -> Result<BaseboardManagement, StoreError> {
        self.create_obj("create_baseboard", baseboard)
    }

    async fn delete_baseboard(&self, key: &ObjectReference) -> Result<(), StoreError> {
        self.delete_obj::<BaseboardManagement>("delete_baseboard", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{ClusterSpec, NodeConfig, VipConfig};
    use kube::api::ObjectMeta;

    fn cluster(finalizers: Vec<String>) -> Cluster {
        Cluster {
            metadata: ObjectMeta {
                name: Some("c1".to_string()),
                namespace: Some("default".to_string()),
                finalizers: Some(finalizers),
                ..Default::default()
            },
            spec: ClusterSpec {
                version: "v1".to_string(),
                image_url: None,
                nodes: Vec::<NodeConfig>::new(),
                vip_config: VipConfig {
                    address_pool_reference: ObjectReference::new("default", "pool"),
                    static_address: None,
                },
            },
            status: None,
        }
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let mock = MockStoreClient::new();
        mock.insert_cluster(cluster(vec![]));
        let key = ObjectReference::new("default", "c1");

        let first = mock.get_cluster(&key).await.unwrap();
        let second = first.clone();
        mock.update_cluster_status(&first).await.unwrap();

        let err = mock.update_cluster_status(&second).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(mock.write_count("update_cluster_status"), 1);
    }

    #[tokio::test]
    async fn test_spec_update_keeps_status() {
        let mock = MockStoreClient::new();
        let mut seeded = cluster(vec![]);
        seeded.status = Some(ClusterStatus {
            cluster_token: "token".to_string(),
            ..Default::default()
        });
        mock.insert_cluster(seeded);
        let key = ObjectReference::new("default", "c1");

        let mut fetched = mock.get_cluster(&key).await.unwrap();
        fetched.status = None;
        fetched.metadata.finalizers = Some(vec!["f".to_string()]);
        mock.update_cluster(&fetched).await.unwrap();

        let stored = mock.cluster(&key).unwrap();
        assert_eq!(stored.status.as_ref().unwrap().cluster_token, "token");
        assert_eq!(stored.finalizers(), &["f".to_string()]);
    }

    #[tokio::test]
    async fn test_finalizer_holds_deletion() {
        let mock = MockStoreClient::new();
        mock.insert_cluster(cluster(vec!["f".to_string()]));
        let key = ObjectReference::new("default", "c1");

        mock.mark_cluster_for_deletion(&key);
        let mut pending = mock.get_cluster(&key).await.unwrap();
        assert!(pending.meta().deletion_timestamp.is_some());

        pending.metadata.finalizers = Some(vec![]);
        mock.update_cluster(&pending).await.unwrap();
        assert!(mock.cluster(&key).is_none());
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let mock = MockStoreClient::new();
        mock.insert_cluster(cluster(vec![]));
        let key = ObjectReference::new("default", "c1");
        mock.fail_next("get_cluster", StoreError::Unavailable("down".to_string()));

        assert!(mock.get_cluster(&key).await.unwrap_err().is_transient());
        assert!(mock.get_cluster(&key).await.is_ok());
    }
}
