//! StoreClient trait for mocking
//!
//! This trait abstracts the declarative object store so reconcilers can be
//! unit tested against an in-memory implementation. The concrete
//! `KubeStoreClient` implements it against the Kubernetes API.
//!
//! Every write is conditional on the object's `metadata.resourceVersion`;
//! a stale version fails with [`StoreError::Conflict`] and the caller must
//! re-read before retrying.

use crate::error::StoreError;
use crds::{AddressPool, BaseboardManagement, Cluster, Hardware, Inventory, ObjectReference};

/// Trait for declarative object store operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait StoreClientTrait: Send + Sync {
    // Inventory
    /// Fetch one Inventory
    async fn get_inventory(&self, key: &ObjectReference) -> Result<Inventory, StoreError>;
    /// Every Inventory in `namespace`, or in all namespaces when `None`
    async fn list_inventories(&self, namespace: Option<&str>) -> Result<Vec<Inventory>, StoreError>;
    /// Writes metadata and spec (finalizers); status is left untouched
    async fn update_inventory(&self, inventory: &Inventory) -> Result<Inventory, StoreError>;
    /// Writes the status subresource only
    async fn update_inventory_status(&self, inventory: &Inventory) -> Result<Inventory, StoreError>;

    // AddressPool
    /// Fetch one AddressPool
    async fn get_address_pool(&self, key: &ObjectReference) -> Result<AddressPool, StoreError>;
    /// Every AddressPool in `namespace`, or in all namespaces when `None`
    async fn list_address_pools(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<AddressPool>, StoreError>;
    /// Writes the status subresource only
    async fn update_address_pool_status(
        &self,
        pool: &AddressPool,
    ) -> Result<AddressPool, StoreError>;

    // Cluster
    /// Fetch one Cluster
    async fn get_cluster(&self, key: &ObjectReference) -> Result<Cluster, StoreError>;
    /// Writes metadata and spec (finalizers); status is left untouched
    async fn update_cluster(&self, cluster: &Cluster) -> Result<Cluster, StoreError>;
    /// Writes the status subresource only
    async fn update_cluster_status(&self, cluster: &Cluster) -> Result<Cluster, StoreError>;

    // Hardware (provisioning collaborator)
    /// Fetch one Hardware descriptor
    async fn get_hardware(&self, key: &ObjectReference) -> Result<Hardware, StoreError>;
    /// Create a Hardware descriptor; `Conflict` if it already exists
    async fn create_hardware(&self, hardware: &Hardware) -> Result<Hardware, StoreError>;
    /// Replace a Hardware descriptor's spec
    async fn update_hardware(&self, hardware: &Hardware) -> Result<Hardware, StoreError>;
    /// Delete a Hardware descriptor
    async fn delete_hardware(&self, key: &ObjectReference) -> Result<(), StoreError>;

    // BaseboardManagement (BMC collaborator)
    /// Fetch one BaseboardManagement object
    async fn get_baseboard(&self, key: &ObjectReference) -> Result<BaseboardManagement, StoreError>;
    /// Create a BaseboardManagement object; `Conflict` if it already exists
    async fn create_baseboard(
        &self,
        baseboard: &BaseboardManagement,
    ) -> Result<BaseboardManagement, StoreError>;
    /// Delete a BaseboardManagement object
    async fn delete_baseboard(&self, key: &ObjectReference) -> Result<(), StoreError>;
}
