//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::config::ControllerConfig;
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use crds::*;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use store_client::MockStoreClient;

/// Name of the VIP pool referenced by [`create_test_cluster`]
pub const VIP_POOL: &str = "vip-pool";

fn meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(format!("uid-{}-{}", namespace, name)),
        ..Default::default()
    }
}

/// Reconciler backed by `mock`
pub fn create_test_reconciler(mock: MockStoreClient) -> Reconciler {
    Reconciler::new(
        Box::new(mock),
        ControllerConfig::default(),
        Metrics::new().unwrap(),
    )
}

/// AddressPool over `cidr` with gateway `.1`, ready or not
pub fn create_test_address_pool(
    name: &str,
    namespace: &str,
    cidr: &str,
    start: &str,
    end: &str,
    ready: bool,
) -> AddressPool {
    let gateway = cidr
        .split('/')
        .next()
        .map(|base| {
            let mut octets: Vec<&str> = base.split('.').collect();
            octets.pop();
            format!("{}.1", octets.join("."))
        })
        .unwrap();
    AddressPool {
        metadata: meta(name, namespace),
        spec: AddressPoolSpec {
            cidr: cidr.to_string(),
            start_address: Some(start.to_string()),
            end_address: Some(end.to_string()),
            gateway,
            netmask: None,
        },
        status: ready.then(|| AddressPoolStatus {
            status: PoolState::Ready,
            start_address: start.to_string(),
            last_address: end.to_string(),
            netmask: "255.255.255.0".to_string(),
            ..Default::default()
        }),
    }
}

/// Inventory with BMC details, unbound, in `phase`
pub fn create_test_inventory(name: &str, namespace: &str, phase: InventoryPhase) -> Inventory {
    Inventory {
        metadata: meta(name, namespace),
        spec: InventorySpec {
            primary_disk: "/dev/sda".to_string(),
            management_interface: ManagementInterface {
                mac_address: format!("0c:c4:7a:00:00:{:02x}", name.len()),
                ..Default::default()
            },
            baseboard_spec: BaseboardManagementSpec {
                connection: Connection {
                    host: format!("{}-bmc.example.com", name),
                    port: 623,
                    insecure_tls: true,
                    auth_secret_ref: SecretReference {
                        name: "bmc-creds".to_string(),
                        namespace: namespace.to_string(),
                    },
                },
                power: None,
            },
        },
        status: Some(InventoryStatus {
            status: phase,
            ..Default::default()
        }),
    }
}

/// Cluster whose nodes are `(inventory, pool)` pairs in the same namespace
pub fn create_test_cluster(name: &str, namespace: &str, nodes: &[(&str, &str)]) -> Cluster {
    Cluster {
        metadata: meta(name, namespace),
        spec: ClusterSpec {
            version: "v1.2.0".to_string(),
            image_url: None,
            nodes: nodes
                .iter()
                .map(|(inventory, pool)| NodeConfig {
                    inventory_reference: ObjectReference::new(namespace, *inventory),
                    address_pool_reference: ObjectReference::new(namespace, *pool),
                    static_address: None,
                })
                .collect(),
            vip_config: VipConfig {
                address_pool_reference: ObjectReference::new(namespace, VIP_POOL),
                static_address: None,
            },
        },
        status: None,
    }
}

/// Cluster that already has a token and virtual address
pub fn create_provisioned_cluster(name: &str, namespace: &str, vip: &str) -> Cluster {
    let mut cluster = create_test_cluster(name, namespace, &[]);
    cluster.status = Some(ClusterStatus {
        status: ClusterPhase::NodesPatched,
        cluster_address: vip.to_string(),
        cluster_token: "cluster-token".to_string(),
        conditions: Conditions::new(),
    });
    cluster
}

/// Inventory bound to `cluster` with a PXE address on 192.168.1.0/24
pub fn create_bound_inventory(
    name: &str,
    namespace: &str,
    cluster: &Cluster,
    address: &str,
    create_mode: bool,
) -> Inventory {
    let mut inventory = create_test_inventory(name, namespace, InventoryPhase::Ready);
    let mut status = InventoryStatus {
        status: InventoryPhase::Ready,
        generated_password: "node-password".to_string(),
        pxe_boot_config: PxeBootConfig {
            address: address.to_string(),
            gateway: "192.168.1.1".to_string(),
            netmask: "255.255.255.0".to_string(),
        },
        cluster: ObjectReference::new(
            cluster.metadata.namespace.clone().unwrap_or_default(),
            cluster.metadata.name.clone().unwrap_or_default(),
        ),
        ..Default::default()
    };
    status
        .conditions
        .create_or_update(ConditionType::AllocatedToCluster, "node assigned to cluster");
    if create_mode {
        status.conditions.create_or_update(ConditionType::CreateMode, "Create Mode");
    } else {
        status.conditions.create_or_update(ConditionType::JoinMode, "Join Mode");
    }
    inventory.status = Some(status);
    inventory
}
