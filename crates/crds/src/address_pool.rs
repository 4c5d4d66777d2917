//! AddressPool CRD
//!
//! A range of allocatable IPv4 addresses plus gateway/netmask, shared by
//! cluster VIPs and node PXE addresses.

use crate::references::ObjectReferenceWithKind;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared address range
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.dcops.microscaler.io",
    version = "v1alpha1",
    kind = "AddressPool",
    namespaced,
    status = "AddressPoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AddressPoolSpec {
    /// Network in CIDR notation (e.g. "192.168.1.0/24")
    pub cidr: String,

    /// First allocatable address (defaults to the first host address of the CIDR)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_address: Option<String>,

    /// Last allocatable address (defaults to the last host address of the CIDR)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_address: Option<String>,

    /// Gateway handed to nodes; never allocated
    pub gateway: String,

    /// Netmask handed to nodes (derived from the CIDR when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
}

/// Pool readiness
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum PoolState {
    /// Not validated yet
    #[default]
    #[serde(rename = "", alias = "poolNotReady")]
    NotReady,
    /// Range valid, claims may be made
    #[serde(rename = "poolReady")]
    Ready,
    /// Spec cannot be turned into a range
    #[serde(rename = "poolInvalid")]
    Invalid,
}

/// Observed pool state and claims
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AddressPoolStatus {
    /// Readiness flag
    #[serde(default)]
    pub status: PoolState,

    /// Resolved first allocatable address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub start_address: String,

    /// Resolved last allocatable address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_address: String,

    /// Resolved netmask
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub netmask: String,

    /// Address -> claimant
    #[serde(default)]
    pub address_allocation: BTreeMap<String, ObjectReferenceWithKind>,

    /// Unclaimed addresses left in range
    #[serde(default)]
    pub available_addresses: u32,

    /// Validation error when `spec` cannot be turned into a range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AddressPoolStatus {
    /// Pool published as ready
    pub fn is_ready(&self) -> bool {
        self.status == PoolState::Ready
    }

    /// Address currently held by `claimant`, if any
    pub fn claim_of(&self, claimant: &ObjectReferenceWithKind) -> Option<&str> {
        self.address_allocation
            .iter()
            .find(|(_, holder)| *holder == claimant)
            .map(|(address, _)| address.as_str())
    }
}

impl AddressPool {
    /// Readiness flag; a pool without status is not ready
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(AddressPoolStatus::is_ready)
    }
}
