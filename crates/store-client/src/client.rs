//! Kubernetes-backed store client
//!
//! Implements [`StoreClientTrait`] on top of `kube::Api`. Writes use
//! `replace`/`replace_status` (HTTP PUT) so the API server enforces the
//! resource version carried in the object and answers 409 on a stale write.

use crate::error::StoreError;
use crate::store_trait::StoreClientTrait;
use crds::{AddressPool, BaseboardManagement, Cluster, Hardware, Inventory, ObjectReference};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Store client talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeStoreClient {
    client: Client,
    timeout: Duration,
}

impl std::fmt::Debug for KubeStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStoreClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl KubeStoreClient {
    /// Create a new store client
    ///
    /// # Arguments
    /// * `client` - Kubernetes client
    /// * `timeout` - Deadline applied to every store call
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Run one store call under the deadline
    async fn call<T, F>(&self, what: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::from_kube(e, what)),
            Err(_) => Err(StoreError::Timeout(format!(
                "{} after {}s",
                what,
                self.timeout.as_secs()
            ))),
        }
    }

    async fn get<K>(&self, kind: &str, key: &ObjectReference) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let what = format!("{} {}", kind, key);
        debug!("Fetching {}", what);
        let api: Api<K> = self.api(&key.namespace);
        self.call(&what, api.get(&key.name)).await
    }

    async fn create<K>(&self, kind: &str, obj: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let key = object_key(kind, obj)?;
        let what = format!("{} {}", kind, key);
        debug!("Creating {}", what);
        let api: Api<K> = self.api(&key.namespace);
        self.call(&what, api.create(&PostParams::default(), obj)).await
    }

    async fn replace<K>(&self, kind: &str, obj: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let key = object_key(kind, obj)?;
        let what = format!("{} {}", kind, key);
        debug!("Updating {} at resourceVersion {:?}", what, obj.resource_version());
        let api: Api<K> = self.api(&key.namespace);
        self.call(&what, api.replace(&key.name, &PostParams::default(), obj))
            .await
    }

    async fn replace_status<K>(&self, kind: &str, obj: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let key = object_key(kind, obj)?;
        let what = format!("{} {} status", kind, key);
        debug!("Updating {} at resourceVersion {:?}", what, obj.resource_version());
        let data = serde_json::to_vec(obj)?;
        let api: Api<K> = self.api(&key.namespace);
        self.call(&what, api.replace_status(&key.name, &PostParams::default(), data))
            .await
    }

    async fn delete<K>(&self, kind: &str, key: &ObjectReference) -> Result<(), StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let what = format!("{} {}", kind, key);
        debug!("Deleting {}", what);
        let api: Api<K> = self.api(&key.namespace);
        self.call(&what, api.delete(&key.name, &DeleteParams::default()))
            .await
            .map(|_| ())
    }
}

fn object_key<K: Resource>(kind: &str, obj: &K) -> Result<ObjectReference, StoreError> {
    match (obj.meta().namespace.as_deref(), obj.meta().name.as_deref()) {
        (Some(namespace), Some(name)) => Ok(ObjectReference::new(namespace, name)),
        _ => Err(StoreError::InvalidObject(format!(
            "{} is missing name or namespace",
            kind
        ))),
    }
}

#[async_trait::async_trait]
impl StoreClientTrait for KubeStoreClient {
    async fn get_inventory(&self, key: &ObjectReference) -> Result<Inventory, StoreError> {
        self.get("Inventory", key).await
    }

    async fn list_inventories(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<Inventory>, StoreError> {
        let api: Api<Inventory> = match namespace {
            Some(ns) => self.api(ns),
            None => Api::all(self.client.clone()),
        };
        self.call("Inventory list", api.list(&ListParams::default()))
            .await
            .map(|list| list.items)
    }

    async fn update_inventory(&self, inventory: &Inventory) -> Result<Inventory, StoreError> {
        self.replace("Inventory", inventory).await
    }

    async fn update_inventory_status(
        &self,
        inventory: &Inventory,
    ) -> Result<Inventory, StoreError> {
        self.replace_status("Inventory", inventory).await
    }

    async fn get_address_pool(&self, key: &ObjectReference) -> Result<AddressPool, StoreError> {
        self.get("AddressPool", key).await
    }

    async fn list_address_pools(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<AddressPool>, StoreError> {
        let api: Api<AddressPool> = match namespace {
            Some(ns) => self.api(ns),
            None => Api::all(self.client.clone()),
        };
        self.call("AddressPool list", api.list(&ListParams::default()))
            .await
            .map(|list| list.items)
    }

    async fn update_address_pool_status(
        &self,
        pool: &AddressPool,
    ) -> Result<AddressPool, StoreError> {
        self.replace_status("AddressPool", pool).await
    }

    async fn get_cluster(&self, key: &ObjectReference) -> Result<Cluster, StoreError> {
        self.get("Cluster", key).await
    }

    async fn update_cluster(&self, cluster: &Cluster) -> Result<Cluster, StoreError> {
        self.replace("Cluster", cluster).await
    }

    async fn update_cluster_status(&self, cluster: &Cluster) -> Result<Cluster, StoreError> {
        self.replace_status("Cluster", cluster).await
    }

    async fn get_hardware(&self, key: &ObjectReference) -> Result<Hardware, StoreError> {
        self.get("Hardware", key).await
    }

    async fn create_hardware(&self, hardware: &Hardware) -> Result<Hardware, StoreError> {
        self.create("Hardware", hardware).await
    }

    async fn update_hardware(&self, hardware: &Hardware) -> Result<Hardware, StoreError> {
        self.replace("Hardware", hardware).await
    }

    async fn delete_hardware(&self, key: &ObjectReference) -> Result<(), StoreError> {
        self.delete::<Hardware>("Hardware", key).await
    }

    async fn get_baseboard(
        &self,
        key: &ObjectReference,
    ) -> Result<BaseboardManagement, StoreError> {
        self.get("BaseboardManagement", key).await
    }

    async fn create_baseboard(
        &self,
        baseboard: &BaseboardManagement,
    ) -> Result<BaseboardManagement, StoreError> {
        self.create("BaseboardManagement", baseboard).await
    }

    async fn delete_baseboard(&self, key: &ObjectReference) -> Result<(), StoreError> {
        self.delete::<BaseboardManagement>("BaseboardManagement", key).await
    }
}
