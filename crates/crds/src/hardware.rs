//! Hardware CRD (tinkerbell.org)
//!
//! Typed mirror of the hardware-provisioning collaborator's descriptor. The
//! Cluster controller produces one per node, named after the Inventory and
//! owned by the Cluster.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of one provisioned machine
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "tinkerbell.org",
    version = "v1alpha1",
    kind = "Hardware",
    namespaced,
    status = "HardwareStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSpec {
    /// Disks available for installation; the first one is the install target
    #[serde(default)]
    pub disks: Vec<Disk>,

    /// Network interfaces used for PXE
    #[serde(default)]
    pub interfaces: Vec<Interface>,

    /// Instance metadata served to the workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HardwareMetadata>,

    /// Cloud-init style user data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

/// Install disk
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct Disk {
    /// Block device path
    pub device: String,
}

/// Network interface
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    /// DHCP lease handed to the interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp: Option<Dhcp>,

    /// Network boot permissions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netboot: Option<Netboot>,
}

/// DHCP settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Dhcp {
    /// Interface MAC address
    pub mac: String,

    /// Hostname offered with the lease
    #[serde(default)]
    pub hostname: String,

    /// CPU architecture
    #[serde(default)]
    pub arch: String,

    /// Boot in UEFI mode
    #[serde(default)]
    pub uefi: bool,

    /// Lease time in seconds
    #[serde(default)]
    pub lease_time: i64,

    /// DNS servers
    #[serde(default)]
    pub name_servers: Vec<String>,

    /// Static address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ip>,
}

/// IPv4 settings of an interface
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct Ip {
    /// Interface address
    pub address: String,
    /// Default gateway
    pub gateway: String,
    /// Dotted netmask
    pub netmask: String,
}

/// Netboot permissions
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Netboot {
    /// PXE boot allowed
    #[serde(default, rename = "allowPXE")]
    pub allow_pxe: bool,

    /// Workflows may run on this machine
    #[serde(default)]
    pub allow_workflow: bool,
}

/// Metadata served to the machine
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HardwareMetadata {
    /// Instance identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<Instance>,

    /// Provisioning state as tracked by the workflow engine
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
}

/// Instance identity
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Instance id
    pub id: String,

    /// Instance hostname
    #[serde(default)]
    pub hostname: String,

    /// PXE boot allowed
    #[serde(default)]
    pub allow_pxe: bool,
}

/// Observed state reported by the workflow engine
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HardwareStatus {
    /// Provisioning state
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
}
