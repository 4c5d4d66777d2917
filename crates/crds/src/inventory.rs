//! Inventory CRD
//!
//! One physical machine available for cluster membership.

use crate::baseboard::BaseboardManagementSpec;
use crate::conditions::{ConditionType, Conditions};
use crate::references::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer guarding BMC object cleanup on Inventory deletion
pub const INVENTORY_FINALIZER: &str = "finalizer.inventory.metal.dcops.microscaler.io";

/// Desired state of one machine
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.microscaler.io",
    version = "v1alpha1",
    kind = "Inventory",
    plural = "inventories",
    shortname = "inv",
    namespaced,
    status = "InventoryStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InventorySpec {
    /// Install target disk (e.g. "/dev/sda")
    pub primary_disk: String,

    /// PXE management network identity
    pub management_interface: ManagementInterface,

    /// BMC connection used to create the BaseboardManagement object
    pub baseboard_spec: BaseboardManagementSpec,
}

/// PXE management interface
///
/// Only the MAC address is required. A static address pins the node address
/// requested from the pool; static gateway/netmask override the pool values in
/// the hardware descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManagementInterface {
    /// PXE interface MAC address
    pub mac_address: String,

    /// Requested static address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Gateway override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    /// Netmask override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,

    /// DNS servers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name_servers: Vec<String>,
}

/// Inventory lifecycle phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum InventoryPhase {
    /// Not yet seen by the controller
    #[default]
    #[serde(rename = "unbound", alias = "")]
    Unbound,
    /// BMC object submitted
    #[serde(rename = "bmcObjectCreated")]
    BmcObjectCreated,
    /// Hardware descriptor handed to the workflow engine
    #[serde(rename = "tinkerbellHardwareCreated")]
    TinkHardwareSubmitted,
    /// BMC reachable, node can be bound
    #[serde(rename = "inventoryNodeReady")]
    Ready,
    /// Set by an external actor once the node runs
    #[serde(rename = "inventoryRunning")]
    Running,
}

/// Resolved PXE network parameters, populated once bound to a cluster
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PxeBootConfig {
    /// Node address claimed from the pool
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,

    /// Pool gateway
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gateway: String,

    /// Pool netmask
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub netmask: String,
}

impl PxeBootConfig {
    /// Nothing resolved yet
    pub fn is_empty(&self) -> bool {
        self.address.is_empty() && self.gateway.is_empty() && self.netmask.is_empty()
    }
}

/// Observed Inventory state
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InventoryStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub status: InventoryPhase,

    /// One-time provisioning password
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generated_password: String,

    /// Hardware descriptor handed to the workflow engine
    #[serde(default, rename = "hardwareID", skip_serializing_if = "String::is_empty")]
    pub hardware_id: String,

    /// Resolved PXE network parameters
    #[serde(default, skip_serializing_if = "PxeBootConfig::is_empty")]
    pub pxe_boot_config: PxeBootConfig,

    /// Owning cluster, empty when unbound
    #[serde(default, skip_serializing_if = "ObjectReference::is_empty")]
    pub cluster: ObjectReference,

    /// Condition ledger
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

impl InventoryStatus {
    /// Full reset to a reusable, unbound state
    ///
    /// Network parameters, binding, password, workflow identifier and every
    /// condition are cleared so the next binding starts from scratch.
    pub fn release(&mut self) {
        *self = Self::default();
    }

    /// Bound to `cluster`
    pub fn is_allocated_to(&self, cluster: &ObjectReference) -> bool {
        self.conditions.exists(ConditionType::AllocatedToCluster) && self.cluster == *cluster
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_accepts_empty_string_as_unbound() {
        let phase: InventoryPhase = serde_json::from_value(serde_json::json!("")).unwrap();
        assert_eq!(phase, InventoryPhase::Unbound);
        let ready: InventoryPhase =
            serde_json::from_value(serde_json::json!("inventoryNodeReady")).unwrap();
        assert_eq!(ready, InventoryPhase::Ready);
    }

    #[test]
    fn test_release_clears_everything() {
        let mut status = InventoryStatus {
            status: InventoryPhase::Ready,
            generated_password: "secret".to_string(),
            hardware_id: "default/node-1".to_string(),
            pxe_boot_config: PxeBootConfig {
                address: "192.168.1.10".to_string(),
                gateway: "192.168.1.1".to_string(),
                netmask: "255.255.255.0".to_string(),
            },
            cluster: ObjectReference::new("default", "c1"),
            conditions: Conditions::new(),
        };
        status.conditions.create_or_update(ConditionType::AllocatedToCluster, "bound");
        status.release();
        assert_eq!(status, InventoryStatus::default());
        assert!(!status.is_allocated_to(&ObjectReference::new("default", "c1")));
    }
}
