//! Inventory reconciler
//!
//! Creates the BaseboardManagement object for each Inventory, folds the BMC
//! collaborator's outcome into conditions and phase, and holds the Inventory
//! back from deletion while it is bound to a Cluster.

use super::Reconciler;
use crate::error::ControllerError;
use crate::reconciler::{add_finalizer, has_finalizer, object_key, remove_finalizer};
use crds::{
    AddressPool, BaseboardManagement, BmcTaskOutcome, ConditionType, Inventory, InventoryPhase,
    InventoryStatus, ObjectReference, ObjectReferenceWithKind, INVENTORY_FINALIZER,
};
use kube::api::ObjectMeta;
use kube::Resource;
use tracing::{debug, info, warn};

const BMC_SUBMITTED: &str = "baseboard management object submitted";
const BMC_COMPLETED: &str = "baseboard management controller contactable";

impl Reconciler {
    /// Ensure the BMC object exists and fold its outcome into the Inventory status
    pub async fn reconcile_inventory(&self, inventory: &Inventory) -> Result<(), ControllerError> {
        let key = object_key(inventory, "Inventory")?;
        info!("Reconciling Inventory {}", key);

        let mut inventory = match self.store.get_inventory(&key).await {
            Ok(i) => i,
            Err(e) if e.is_not_found() => {
                debug!("Inventory {} no longer exists, nothing to do", key);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if inventory.metadata.deletion_timestamp.is_some() {
            return self.finalize_inventory(inventory, &key).await;
        }

        if add_finalizer(&mut inventory, INVENTORY_FINALIZER) {
            inventory = self.store.update_inventory(&inventory).await?;
            debug!("Added finalizer to Inventory {}", key);
        }

        let original = inventory.status.clone().unwrap_or_default();
        let mut status = original.clone();

        match self.store.get_baseboard(&key).await {
            Ok(bmc) => {
                let outcome = bmc
                    .status
                    .map(|s| s.task_outcome())
                    .unwrap_or(BmcTaskOutcome::Pending);
                apply_bmc_outcome(&mut status, outcome, &key);
            }
            Err(e) if e.is_not_found() => {
                let bmc = baseboard_for(&inventory, &key);
                self.store.create_baseboard(&bmc).await?;
                info!("Created BaseboardManagement {}", key);
                apply_bmc_outcome(&mut status, BmcTaskOutcome::Pending, &key);
            }
            Err(e) => return Err(e.into()),
        }

        promote_if_provisioned(&mut status, &key);

        if status == original {
            debug!("Inventory {} status unchanged", key);
            return Ok(());
        }
        inventory.status = Some(status);
        self.store.update_inventory_status(&inventory).await?;
        Ok(())
    }

    /// Startup sweep: reset Inventories bound to a Cluster that no longer exists
    ///
    /// A Cluster force-deleted past its finalizer leaves its nodes bound for
    /// good. Their pool claims are dropped before the binding is reset.
    /// Returns how many Inventories were released.
    pub async fn release_orphaned_inventories(&self) -> Result<usize, ControllerError> {
        let namespace = self.config.namespace.as_deref();
        let inventories = self.store.list_inventories(namespace).await?;
        let mut pools: Option<Vec<AddressPool>> = None;
        let mut released = 0;
        for mut inventory in inventories {
            let key = object_key(&inventory, "Inventory")?;
            let mut status = inventory.status.clone().unwrap_or_default();
            if !status.conditions.exists(ConditionType::AllocatedToCluster) {
                continue;
            }
            match self.store.get_cluster(&status.cluster).await {
                Ok(_) => continue,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
            warn!("Inventory {} is bound to missing Cluster {}, releasing", key, status.cluster);

            if pools.is_none() {
                pools = Some(self.store.list_address_pools(namespace).await?);
            }
            let claimant = ObjectReferenceWithKind::inventory(&key);
            for pool in pools.as_deref().unwrap_or_default() {
                let holds = pool.status.as_ref().is_some_and(|s| s.claim_of(&claimant).is_some());
                if holds {
                    self.release_claim(&object_key(pool, "AddressPool")?, &claimant).await?;
                }
            }

            status.release();
            inventory.status = Some(status);
            self.store.update_inventory_status(&inventory).await?;
            released += 1;
        }
        Ok(released)
    }

    /// Deletion: wait for release, drop the BMC object, lift the finalizer
    async fn finalize_inventory(
        &self,
        mut inventory: Inventory,
        key: &ObjectReference,
    ) -> Result<(), ControllerError> {
        if !has_finalizer(&inventory, INVENTORY_FINALIZER) {
            return Ok(());
        }
        let status = inventory.status.clone().unwrap_or_default();
        if status.conditions.exists(ConditionType::AllocatedToCluster) {
            return Err(ControllerError::NotYetReady(format!(
                "inventory {} is still bound to cluster {}",
                key, status.cluster
            )));
        }

        match self.store.delete_baseboard(key).await {
            Ok(()) => info!("Deleted BaseboardManagement {}", key),
            Err(e) if e.is_not_found() => debug!("BaseboardManagement {} already gone", key),
            Err(e) => return Err(e.into()),
        }

        remove_finalizer(&mut inventory, INVENTORY_FINALIZER);
        match self.store.update_inventory(&inventory).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        info!("Removed finalizer from Inventory {}", key);
        Ok(())
    }
}

/// BaseboardManagement object for `inventory`, owned by it
fn baseboard_for(inventory: &Inventory, key: &ObjectReference) -> BaseboardManagement {
    BaseboardManagement {
        metadata: ObjectMeta {
            name: Some(key.name.clone()),
            namespace: Some(key.namespace.clone()),
            owner_references: inventory.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        spec: inventory.spec.baseboard_spec.clone(),
        status: None,
    }
}

/// Set `type_` unless it already carries `message`
fn set_condition(status: &mut InventoryStatus, type_: ConditionType, message: &str) {
    if status.conditions.get(type_).is_some_and(|c| c.message == message) {
        return;
    }
    status.conditions.create_or_update(type_, message);
}

fn apply_bmc_outcome(status: &mut InventoryStatus, outcome: BmcTaskOutcome, key: &ObjectReference) {
    match outcome {
        BmcTaskOutcome::Pending => {
            if !status.conditions.exists(ConditionType::BmcTaskSubmitted) {
                status.conditions.create_or_update(ConditionType::BmcTaskSubmitted, BMC_SUBMITTED);
            }
            if status.status == InventoryPhase::Unbound {
                status.status = InventoryPhase::BmcObjectCreated;
            }
        }
        BmcTaskOutcome::Completed => {
            if !status.conditions.exists(ConditionType::BmcTaskCompleted) {
                status.conditions.create_or_update(ConditionType::BmcTaskCompleted, BMC_COMPLETED);
                info!("BMC for Inventory {} is contactable", key);
            }
            status.conditions.remove(ConditionType::BmcTaskError);
            if matches!(status.status, InventoryPhase::Unbound | InventoryPhase::BmcObjectCreated) {
                status.status = InventoryPhase::Ready;
            }
        }
        BmcTaskOutcome::Failed(message) => {
            // no phase regress; surfaced for the operator
            let recorded = status.conditions.get(ConditionType::BmcTaskError);
            if recorded.map(|c| c.message.as_str()) != Some(message.as_str()) {
                warn!("BMC for Inventory {} reported an error: {}", key, message);
            }
            set_condition(status, ConditionType::BmcTaskError, &message);
            if status.status == InventoryPhase::Unbound {
                status.status = InventoryPhase::BmcObjectCreated;
            }
        }
    }
}

/// Ready -> hardware created once the cluster handed the node to the workflow engine
fn promote_if_provisioned(status: &mut InventoryStatus, key: &ObjectReference) {
    if status.status != InventoryPhase::Ready {
        return;
    }
    let conditions = &status.conditions;
    if conditions.exists(ConditionType::AllocatedToCluster)
        && conditions.exists(ConditionType::TinkWorkflowCreated)
        && !conditions.exists(ConditionType::TinkWorkflowError)
    {
        status.status = InventoryPhase::TinkHardwareSubmitted;
        info!("Inventory {} hardware workflow submitted", key);
    }
}
