//! Cluster reconciler
//!
//! Drives a Cluster through three phases, each persisted before the next one
//! starts:
//!
//! 1. `""` -> `clusterConfigReady`: claim the virtual address and generate the join token
//! 2. `clusterConfigReady` -> `clusterNodesPatched`: claim node addresses and bind inventories
//! 3. `clusterNodesPatched` -> `clusterTinkHardwareSubmitted`: create or update hardware
//!    descriptors; re-run on every pass to keep descriptors in sync
//!
//! On deletion, node bindings and address claims are released and owned
//! hardware deleted before the cleanup finalizer is lifted.

use super::Reconciler;
use crate::allocator::{self, AddressRange};
use crate::error::ControllerError;
use crate::reconciler::hardware::build_hardware;
use crate::reconciler::{
    add_finalizer, generate_secret, has_finalizer, object_key, remove_finalizer,
};
use crds::{
    AddressPool, Cluster, ClusterPhase, ConditionType, Inventory, InventoryPhase, ObjectReference,
    ObjectReferenceWithKind, PxeBootConfig, CLUSTER_FINALIZER,
};
use tracing::{debug, info, warn};

impl Reconciler {
    /// Run one pass of the Cluster state machine, or its teardown when deleted
    pub async fn reconcile_cluster(&self, cluster: &Cluster) -> Result<(), ControllerError> {
        let key = object_key(cluster, "Cluster")?;
        info!("Reconciling Cluster {}", key);

        let mut cluster = match self.store.get_cluster(&key).await {
            Ok(c) => c,
            Err(e) if e.is_not_found() => {
                debug!("Cluster {} no longer exists, nothing to do", key);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if cluster.metadata.deletion_timestamp.is_some() {
            return self.cleanup_cluster(cluster, &key).await;
        }

        match self.converge_cluster(&mut cluster, &key).await {
            Ok(()) => {
                self.clear_cluster_blocker(&mut cluster, &key).await;
                Ok(())
            }
            Err(e) => {
                self.report_cluster_blocker(&key, &e).await;
                Err(e)
            }
        }
    }

    async fn converge_cluster(
        &self,
        cluster: &mut Cluster,
        key: &ObjectReference,
    ) -> Result<(), ControllerError> {
        self.ensure_cluster_finalizer(cluster, key).await?;
        self.generate_cluster_config(cluster, key).await?;
        self.patch_nodes_and_pools(cluster, key).await?;
        self.create_hardware(cluster, key).await?;
        Ok(())
    }

    /// Attach the cleanup finalizer before any claim is recorded
    async fn ensure_cluster_finalizer(
        &self,
        cluster: &mut Cluster,
        key: &ObjectReference,
    ) -> Result<(), ControllerError> {
        if !add_finalizer(cluster, CLUSTER_FINALIZER) {
            return Ok(());
        }
        *cluster = self.store.update_cluster(cluster).await?;
        debug!("Added finalizer to Cluster {}", key);
        Ok(())
    }

    /// Phase 1: virtual address and token
    async fn generate_cluster_config(
        &self,
        cluster: &mut Cluster,
        key: &ObjectReference,
    ) -> Result<(), ControllerError> {
        let mut status = cluster.status.clone().unwrap_or_default();
        if status.status != ClusterPhase::Pending {
            debug!("Cluster {} config already generated, skipping", key);
            return Ok(());
        }

        let pool_key = cluster.spec.vip_config.address_pool_reference.resolve(&key.namespace);
        let mut pool = self.ready_pool(&pool_key).await?;
        let claimant = ObjectReferenceWithKind::cluster(key);
        let requested = cluster.spec.vip_config.static_address.as_deref();
        let vip = self.claim_address(&mut pool, &pool_key, &claimant, requested).await?;

        status.cluster_address = vip;
        if status.cluster_token.is_empty() {
            status.cluster_token = generate_secret();
        }
        status.status = ClusterPhase::ConfigReady;
        cluster.status = Some(status);
        *cluster = self.store.update_cluster_status(cluster).await?;
        info!("Cluster {} config ready", key);
        Ok(())
    }

    /// Phase 2: bind every desired node
    async fn patch_nodes_and_pools(
        &self,
        cluster: &mut Cluster,
        key: &ObjectReference,
    ) -> Result<(), ControllerError> {
        let mut status = cluster.status.clone().unwrap_or_default();
        if status.status != ClusterPhase::ConfigReady {
            debug!("Cluster {} nodes already patched, skipping", key);
            return Ok(());
        }

        for (index, node) in cluster.spec.nodes.iter().enumerate() {
            let inventory_key = node.inventory_reference.resolve(&key.namespace);
            let pool_key = node.address_pool_reference.resolve(&key.namespace);

            let mut inventory = self.store.get_inventory(&inventory_key).await?;
            let inventory_status = inventory.status.clone().unwrap_or_default();
            if inventory_status.is_allocated_to(key) {
                debug!(
                    "Inventory {} already allocated to Cluster {}, skipping",
                    inventory_key, key
                );
                continue;
            }
            if inventory_status.conditions.exists(ConditionType::AllocatedToCluster) {
                return Err(ControllerError::NotYetReady(format!(
                    "inventory {} is bound to cluster {}",
                    inventory_key, inventory_status.cluster
                )));
            }

            let mut pool = self.ready_pool(&pool_key).await?;
            if inventory_status.status != InventoryPhase::Ready {
                return Err(ControllerError::NotYetReady(format!(
                    "waiting for inventory {} to be ready",
                    inventory_key
                )));
            }

            let claimant = ObjectReferenceWithKind::inventory(&inventory_key);
            let requested = node
                .static_address
                .as_deref()
                .or(inventory.spec.management_interface.address.as_deref());
            let address = self.claim_address(&mut pool, &pool_key, &claimant, requested).await?;

            let pool_status = pool.status.clone().unwrap_or_default();
            let netmask = if pool_status.netmask.is_empty() {
                AddressRange::from_spec(&pool.spec)?.netmask().to_string()
            } else {
                pool_status.netmask
            };

            let mut bound = inventory_status;
            bound.pxe_boot_config = PxeBootConfig {
                address: address.clone(),
                gateway: pool.spec.gateway.clone(),
                netmask,
            };
            if bound.generated_password.is_empty() {
                bound.generated_password = generate_secret();
            }
            bound.cluster = key.clone();
            bound.conditions.create_or_update(
                ConditionType::AllocatedToCluster,
                format!("node assigned to cluster {}", key),
            );
            bound.conditions.remove(ConditionType::Freed);
            if index == 0 {
                bound.conditions.create_or_update(ConditionType::CreateMode, "Create Mode");
                bound.conditions.remove(ConditionType::JoinMode);
            } else {
                bound.conditions.create_or_update(ConditionType::JoinMode, "Join Mode");
                bound.conditions.remove(ConditionType::CreateMode);
            }
            inventory.status = Some(bound);
            self.store.update_inventory_status(&inventory).await?;
            info!("Bound Inventory {} to Cluster {} at {}", inventory_key, key, address);
        }

        status.status = ClusterPhase::NodesPatched;
        cluster.status = Some(status);
        *cluster = self.store.update_cluster_status(cluster).await?;
        info!("Cluster {} nodes patched", key);
        Ok(())
    }

    /// Phase 3: hardware descriptors, updated only on divergence
    async fn create_hardware(
        &self,
        cluster: &mut Cluster,
        key: &ObjectReference,
    ) -> Result<(), ControllerError> {
        let mut status = cluster.status.clone().unwrap_or_default();
        if status.status < ClusterPhase::NodesPatched {
            return Ok(());
        }

        for node in &cluster.spec.nodes {
            let inventory_key = node.inventory_reference.resolve(&key.namespace);
            let mut inventory = self.store.get_inventory(&inventory_key).await?;
            let desired = build_hardware(&inventory, cluster)?;

            let written = match self.store.get_hardware(&inventory_key).await {
                Ok(mut existing) => {
                    if existing.spec == desired.spec {
                        debug!("Hardware {} up to date", inventory_key);
                        Ok(false)
                    } else {
                        existing.spec = desired.spec;
                        self.store.update_hardware(&existing).await.map(|_| true)
                    }
                }
                Err(e) if e.is_not_found() => {
                    self.store.create_hardware(&desired).await.map(|_| true)
                }
                Err(e) => Err(e),
            };

            let mut inventory_status = inventory.status.clone().unwrap_or_default();
            let hardware_id = inventory_key.to_string();
            match written {
                Ok(changed) => {
                    if !changed
                        && inventory_status.hardware_id == hardware_id
                        && inventory_status.conditions.exists(ConditionType::TinkWorkflowCreated)
                    {
                        continue;
                    }
                    info!("Hardware {} submitted for Cluster {}", inventory_key, key);
                    inventory_status.hardware_id = hardware_id;
                    inventory_status.conditions.create_or_update(
                        ConditionType::TinkWorkflowCreated,
                        "tink workflow created",
                    );
                    inventory_status.conditions.remove(ConditionType::TinkWorkflowError);
                    inventory.status = Some(inventory_status);
                    self.store.update_inventory_status(&inventory).await?;
                }
                Err(e) => {
                    if !e.is_conflict() {
                        inventory_status
                            .conditions
                            .create_or_update(ConditionType::TinkWorkflowError, e.to_string());
                        inventory.status = Some(inventory_status);
                        if let Err(write_err) =
                            self.store.update_inventory_status(&inventory).await
                        {
                            warn!(
                                "Failed to record hardware error on Inventory {}: {}",
                                inventory_key, write_err
                            );
                        }
                    }
                    return Err(e.into());
                }
            }
        }

        if status.status == ClusterPhase::NodesPatched {
            status.status = ClusterPhase::TinkHardwareSubmitted;
            cluster.status = Some(status);
            *cluster = self.store.update_cluster_status(cluster).await?;
            info!("Cluster {} hardware submitted", key);
        }
        Ok(())
    }

    /// Teardown: release inventories and claims, delete hardware, lift the finalizer
    async fn cleanup_cluster(
        &self,
        mut cluster: Cluster,
        key: &ObjectReference,
    ) -> Result<(), ControllerError> {
        if !has_finalizer(&cluster, CLUSTER_FINALIZER) {
            debug!("Cluster {} has no finalizer, nothing to clean up", key);
            return Ok(());
        }
        info!("Cleaning up Cluster {}", key);

        for node in &cluster.spec.nodes {
            let inventory_key = node.inventory_reference.resolve(&key.namespace);
            let pool_key = node.address_pool_reference.resolve(&key.namespace);

            // claims and hardware of a node bound elsewhere belong to that cluster
            let inventory = match self.store.get_inventory(&inventory_key).await {
                Ok(inventory) => {
                    let status = inventory.status.clone().unwrap_or_default();
                    if !status.is_allocated_to(key) {
                        debug!(
                            "Inventory {} is not bound to Cluster {}, leaving it",
                            inventory_key, key
                        );
                        continue;
                    }
                    Some(inventory)
                }
                Err(e) if e.is_not_found() => {
                    warn!(
                        "Inventory {} already gone while cleaning up Cluster {}",
                        inventory_key, key
                    );
                    None
                }
                Err(e) => return Err(e.into()),
            };

            self.release_claim(&pool_key, &ObjectReferenceWithKind::inventory(&inventory_key))
                .await?;
            self.delete_owned_hardware(&inventory_key, &cluster, key).await?;

            // binding goes last so a failed pass finds the node still bound
            if let Some(inventory) = inventory {
                self.release_inventory(inventory, &inventory_key, key).await?;
            }
        }

        let vip_pool = cluster.spec.vip_config.address_pool_reference.resolve(&key.namespace);
        self.release_claim(&vip_pool, &ObjectReferenceWithKind::cluster(key)).await?;

        remove_finalizer(&mut cluster, CLUSTER_FINALIZER);
        match self.store.update_cluster(&cluster).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        info!("Removed finalizer from Cluster {}", key);
        Ok(())
    }

    /// Fully reset an Inventory bound to `cluster`
    async fn release_inventory(
        &self,
        mut inventory: Inventory,
        inventory_key: &ObjectReference,
        cluster: &ObjectReference,
    ) -> Result<(), ControllerError> {
        let mut status = inventory.status.clone().unwrap_or_default();
        status.release();
        inventory.status = Some(status);
        match self.store.update_inventory_status(&inventory).await {
            Ok(_) => {
                info!("Released Inventory {} from Cluster {}", inventory_key, cluster);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the Hardware at `hardware_key` if `cluster` controls it
    async fn delete_owned_hardware(
        &self,
        hardware_key: &ObjectReference,
        cluster: &Cluster,
        key: &ObjectReference,
    ) -> Result<(), ControllerError> {
        let hardware = match self.store.get_hardware(hardware_key).await {
            Ok(hw) => hw,
            Err(e) if e.is_not_found() => {
                debug!("Hardware {} already gone", hardware_key);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let owned = cluster.metadata.uid.as_deref().is_some_and(|uid| {
            hardware
                .metadata
                .owner_references
                .iter()
                .flatten()
                .any(|owner| owner.uid == uid)
        });
        if !owned {
            warn!("Hardware {} is not owned by Cluster {}, leaving it", hardware_key, key);
            return Ok(());
        }
        match self.store.delete_hardware(hardware_key).await {
            Ok(()) => info!("Deleted Hardware {}", hardware_key),
            Err(e) if e.is_not_found() => debug!("Hardware {} already gone", hardware_key),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Drop the address held by `claimant` in the pool at `pool_key`, if any
    pub(super) async fn release_claim(
        &self,
        pool_key: &ObjectReference,
        claimant: &ObjectReferenceWithKind,
    ) -> Result<(), ControllerError> {
        let mut pool = match self.store.get_address_pool(pool_key).await {
            Ok(p) => p,
            Err(e) if e.is_not_found() => {
                warn!("AddressPool {} already gone, skipping release for {}", pool_key, claimant);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let mut status = pool.status.clone().unwrap_or_default();
        let released = match AddressRange::from_spec(&pool.spec) {
            Ok(range) => allocator::release_claimant(&mut status, &range, claimant),
            Err(_) => {
                let address = status.claim_of(claimant).map(str::to_owned);
                if let Some(address) = &address {
                    status.address_allocation.remove(address);
                }
                address
            }
        };
        let Some(address) = released else {
            debug!("{} holds no address in AddressPool {}", claimant, pool_key);
            return Ok(());
        };
        pool.status = Some(status);
        self.store.update_address_pool_status(&pool).await?;
        info!("Released {} from AddressPool {} ({})", address, pool_key, claimant);
        Ok(())
    }

    /// Fetch a pool and require it ready
    async fn ready_pool(&self, pool_key: &ObjectReference) -> Result<AddressPool, ControllerError> {
        let pool = self.store.get_address_pool(pool_key).await?;
        if !pool.is_ready() {
            return Err(ControllerError::NotYetReady(format!(
                "waiting for address pool {} to be ready",
                pool_key
            )));
        }
        Ok(pool)
    }

    /// Reuse the claimant's address or allocate one, persisting the pool first
    async fn claim_address(
        &self,
        pool: &mut AddressPool,
        pool_key: &ObjectReference,
        claimant: &ObjectReferenceWithKind,
        requested: Option<&str>,
    ) -> Result<String, ControllerError> {
        let mut status = pool.status.clone().unwrap_or_default();
        if let Some(existing) = status.claim_of(claimant) {
            debug!("{} already holds {} in AddressPool {}", claimant, existing, pool_key);
            return Ok(existing.to_owned());
        }
        let range = AddressRange::from_spec(&pool.spec)?;
        let address = allocator::allocate(&mut status, &range, claimant, requested).map_err(|e| {
            warn!("Allocation from AddressPool {} for {} failed: {}", pool_key, claimant, e);
            ControllerError::from(e)
        })?;
        pool.status = Some(status);
        *pool = self.store.update_address_pool_status(pool).await?;
        info!("Allocated {} from AddressPool {} to {}", address, pool_key, claimant);
        Ok(address)
    }

    /// Record the current blocking reason on the Cluster
    async fn report_cluster_blocker(&self, key: &ObjectReference, err: &ControllerError) {
        let (set, clear) = if err.is_retriable() {
            (ConditionType::WaitingForDependencies, ConditionType::ReconcileError)
        } else {
            (ConditionType::ReconcileError, ConditionType::WaitingForDependencies)
        };
        let message = err.to_string();

        let mut cluster = match self.store.get_cluster(key).await {
            Ok(c) => c,
            Err(e) => {
                debug!("Cannot record blocking reason on Cluster {}: {}", key, e);
                return;
            }
        };
        let mut status = cluster.status.clone().unwrap_or_default();
        let unchanged = status.conditions.get(set).is_some_and(|c| c.message == message)
            && !status.conditions.exists(clear);
        if unchanged {
            return;
        }
        status.conditions.create_or_update(set, message);
        status.conditions.remove(clear);
        cluster.status = Some(status);
        if let Err(e) = self.store.update_cluster_status(&cluster).await {
            warn!("Failed to record blocking reason on Cluster {}: {}", key, e);
        }
    }

    /// Drop blocking-reason conditions after a clean pass
    async fn clear_cluster_blocker(&self, cluster: &mut Cluster, key: &ObjectReference) {
        let mut status = cluster.status.clone().unwrap_or_default();
        if !status.conditions.exists(ConditionType::WaitingForDependencies)
            && !status.conditions.exists(ConditionType::ReconcileError)
        {
            return;
        }
        status.conditions.remove(ConditionType::WaitingForDependencies);
        status.conditions.remove(ConditionType::ReconcileError);
        cluster.status = Some(status);
        match self.store.update_cluster_status(cluster).await {
            Ok(updated) => *cluster = updated,
            Err(e) => warn!("Failed to clear blocking reason on Cluster {}: {}", key, e),
        }
    }
}
