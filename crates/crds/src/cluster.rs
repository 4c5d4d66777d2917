//! Cluster CRD
//!
//! A desired grouping of inventory into one provisioned system.

use crate::conditions::Conditions;
use crate::references::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer holding Cluster deletion until node bindings and address claims are released
pub const CLUSTER_FINALIZER: &str = "finalizer.cluster.metal.dcops.microscaler.io";

/// Desired cluster membership and addressing
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.microscaler.io",
    version = "v1alpha1",
    kind = "Cluster",
    namespaced,
    status = "ClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Operating system version to install
    #[serde(default)]
    pub version: String,

    /// Installation image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Desired nodes; the first entry bootstraps the cluster, the rest join it
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    /// Cluster virtual address configuration
    #[serde(rename = "vipConfig")]
    pub vip_config: VipConfig,
}

/// One desired node
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// Inventory to bind
    pub inventory_reference: ObjectReference,

    /// Pool the node address is claimed from
    pub address_pool_reference: ObjectReference,

    /// Pinned node address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_address: Option<String>,
}

/// Virtual address settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VipConfig {
    /// Pool the virtual address is claimed from
    pub address_pool_reference: ObjectReference,

    /// Pinned virtual address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_address: Option<String>,
}

/// Cluster lifecycle phase, strictly ordered
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Default,
)]
pub enum ClusterPhase {
    /// Nothing generated yet
    #[default]
    #[serde(rename = "")]
    Pending,
    /// Virtual address and token generated
    #[serde(rename = "clusterConfigReady")]
    ConfigReady,
    /// Every node bound
    #[serde(rename = "clusterNodesPatched")]
    NodesPatched,
    /// Hardware descriptors submitted
    #[serde(rename = "clusterTinkHardwareSubmitted")]
    TinkHardwareSubmitted,
}

/// Observed Cluster state
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub status: ClusterPhase,

    /// Resolved cluster virtual address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_address: String,

    /// Shared join token
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_token: String,

    /// Blocking-reason conditions
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}
