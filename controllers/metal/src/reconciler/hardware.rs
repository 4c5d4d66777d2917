//! Hardware descriptor generation
//!
//! Builds the `Hardware` object handed to the provisioning workflow engine
//! for one bound Inventory. The descriptor is named after the Inventory and
//! owned by the Cluster, so the engine's objects are garbage collected with
//! the Cluster even if explicit cleanup is skipped.

use crate::error::ControllerError;
use crate::reconciler::object_key;
use crds::{
    Cluster, ConditionType, Dhcp, Disk, Hardware, HardwareMetadata, HardwareSpec, Instance,
    Interface, Inventory, Ip, Netboot,
};
use kube::api::ObjectMeta;
use kube::Resource;
use serde::Serialize;

const DEFAULT_ARCH: &str = "x86_64";
const DEFAULT_LEASE_TIME: i64 = 86400;
const SERVER_PORT: u16 = 443;

/// Install role of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    /// Bootstraps the cluster
    Create,
    /// Joins an existing cluster
    Join,
}

/// Cloud-init style document carried in `spec.userData`
#[derive(Debug, Serialize)]
struct UserData<'a> {
    hostname: &'a str,
    mode: NodeMode,
    token: &'a str,
    vip: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_url: Option<String>,
    password: &'a str,
    install: Install<'a>,
}

#[derive(Debug, Serialize)]
struct Install<'a> {
    device: &'a str,
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
}

/// Desired hardware descriptor for `inventory` as a member of `cluster`
///
/// Fails with `NotYetReady` until the Inventory carries PXE parameters and
/// the Cluster has a token and virtual address.
pub fn build_hardware(
    inventory: &Inventory,
    cluster: &Cluster,
) -> Result<Hardware, ControllerError> {
    let inventory_key = object_key(inventory, "Inventory")?;
    let cluster_key = object_key(cluster, "Cluster")?;

    let status = inventory.status.clone().unwrap_or_default();
    if status.pxe_boot_config.address.is_empty() {
        return Err(ControllerError::NotYetReady(format!(
            "inventory {} has no PXE address yet",
            inventory_key
        )));
    }
    let cluster_status = cluster.status.clone().unwrap_or_default();
    if cluster_status.cluster_address.is_empty() || cluster_status.cluster_token.is_empty() {
        return Err(ControllerError::NotYetReady(format!(
            "cluster {} has no virtual address yet",
            cluster_key
        )));
    }

    let mode = if status.conditions.exists(ConditionType::CreateMode) {
        NodeMode::Create
    } else {
        NodeMode::Join
    };
    let vip = cluster_status.cluster_address.as_str();
    let user_data = UserData {
        hostname: &inventory_key.name,
        mode,
        token: &cluster_status.cluster_token,
        vip,
        server_url: (mode == NodeMode::Join).then(|| format!("https://{}:{}", vip, SERVER_PORT)),
        password: &status.generated_password,
        install: Install {
            device: &inventory.spec.primary_disk,
            version: &cluster.spec.version,
            image_url: cluster.spec.image_url.as_deref(),
        },
    };
    let user_data = serde_yaml::to_string(&user_data).map_err(|e| {
        ControllerError::InvalidConfig(format!("user data for {}: {}", inventory_key, e))
    })?;

    let mgmt = &inventory.spec.management_interface;
    let pxe = &status.pxe_boot_config;
    let ip = Ip {
        address: pxe.address.clone(),
        gateway: mgmt.gateway.clone().unwrap_or_else(|| pxe.gateway.clone()),
        netmask: mgmt.netmask.clone().unwrap_or_else(|| pxe.netmask.clone()),
    };

    Ok(Hardware {
        metadata: ObjectMeta {
            name: Some(inventory_key.name.clone()),
            namespace: Some(inventory_key.namespace.clone()),
            owner_references: cluster.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        spec: HardwareSpec {
            disks: vec![Disk {
                device: inventory.spec.primary_disk.clone(),
            }],
            interfaces: vec![Interface {
                dhcp: Some(Dhcp {
                    mac: mgmt.mac_address.clone(),
                    hostname: inventory_key.name.clone(),
                    arch: DEFAULT_ARCH.to_string(),
                    uefi: true,
                    lease_time: DEFAULT_LEASE_TIME,
                    name_servers: mgmt.name_servers.clone(),
                    ip: Some(ip),
                }),
                netboot: Some(Netboot {
                    allow_pxe: true,
                    allow_workflow: true,
                }),
            }],
            metadata: Some(HardwareMetadata {
                instance: Some(Instance {
                    id: mgmt.mac_address.clone(),
                    hostname: inventory_key.name.clone(),
                    allow_pxe: true,
                }),
                state: String::new(),
            }),
            user_data: Some(user_data),
        },
        status: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_descriptor_for_bound_inventory() {
        let cluster = create_provisioned_cluster("c1", "default", "192.168.0.100");
        let inventory = create_bound_inventory("node-a", "default", &cluster, "192.168.1.10", true);

        let hw = build_hardware(&inventory, &cluster).unwrap();
        assert_eq!(hw.metadata.name.as_deref(), Some("node-a"));
        assert_eq!(hw.metadata.namespace.as_deref(), Some("default"));
        let owners = hw.metadata.owner_references.unwrap();
        assert_eq!(owners[0].kind, "Cluster");
        assert_eq!(owners[0].name, "c1");

        assert_eq!(hw.spec.disks[0].device, "/dev/sda");
        let dhcp = hw.spec.interfaces[0].dhcp.as_ref().unwrap();
        assert_eq!(dhcp.mac, inventory.spec.management_interface.mac_address);
        let ip = dhcp.ip.as_ref().unwrap();
        assert_eq!(ip.address, "192.168.1.10");
        assert_eq!(ip.gateway, "192.168.1.1");
        assert_eq!(ip.netmask, "255.255.255.0");

        let user_data: serde_yaml::Value =
            serde_yaml::from_str(hw.spec.user_data.as_deref().unwrap()).unwrap();
        assert_eq!(user_data["mode"], "create");
        assert_eq!(user_data["vip"], "192.168.0.100");
        assert_eq!(user_data["token"], "cluster-token");
        assert!(user_data.get("server_url").is_none());
    }

    #[test]
    fn test_join_node_points_at_vip() {
        let cluster = create_provisioned_cluster("c1", "default", "192.168.0.100");
        let inventory =
            create_bound_inventory("node-b", "default", &cluster, "192.168.1.11", false);

        let hw = build_hardware(&inventory, &cluster).unwrap();
        let user_data: serde_yaml::Value =
            serde_yaml::from_str(hw.spec.user_data.as_deref().unwrap()).unwrap();
        assert_eq!(user_data["mode"], "join");
        assert_eq!(user_data["server_url"], "https://192.168.0.100:443");
    }

    #[test]
    fn test_descriptor_is_deterministic() {
        let cluster = create_provisioned_cluster("c1", "default", "192.168.0.100");
        let inventory = create_bound_inventory("node-a", "default", &cluster, "192.168.1.10", true);
        assert_eq!(
            build_hardware(&inventory, &cluster).unwrap().spec,
            build_hardware(&inventory, &cluster).unwrap().spec
        );
    }

    #[test]
    fn test_unbound_inventory_is_not_ready() {
        let cluster = create_provisioned_cluster("c1", "default", "192.168.0.100");
        let inventory = create_test_inventory("node-a", "default", crds::InventoryPhase::Ready);
        assert!(matches!(
            build_hardware(&inventory, &cluster),
            Err(ControllerError::NotYetReady(_))
        ));
    }
}
