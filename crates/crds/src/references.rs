//! Kubernetes object references used across the metal CRDs
//!
//! References are namespace-qualified. An empty namespace means "same namespace
//! as the referring object" and is resolved with [`ObjectReference::resolve`].

use kube::{Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// API group for all metal CRDs owned by these controllers
pub const API_GROUP: &str = "metal.dcops.microscaler.io";

/// API version for all metal CRDs owned by these controllers
pub const API_VERSION: &str = "v1alpha1";

/// Namespaced reference to another object
#[derive(
    Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default, PartialOrd, Ord,
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// Namespace of the referenced object (defaults to the referring object's namespace)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Name of the referenced object
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl ObjectReference {
    /// Create a reference from a namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Reference pointing at an existing object
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }

    /// Fill in the namespace from `default_namespace` when left empty
    #[must_use]
    pub fn resolve(&self, default_namespace: &str) -> Self {
        let namespace = if self.namespace.is_empty() {
            default_namespace.to_string()
        } else {
            self.namespace.clone()
        };
        Self {
            namespace,
            name: self.name.clone(),
        }
    }

    /// True when this reference points nowhere (an unbound inventory)
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.namespace.is_empty()
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kind of object holding an address claim in an AddressPool
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum ClaimantKind {
    /// A cluster VIP claim
    Cluster,
    /// A node (PXE interface) claim
    Inventory,
}

impl fmt::Display for ClaimantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimantKind::Cluster => write!(f, "Cluster"),
            ClaimantKind::Inventory => write!(f, "Inventory"),
        }
    }
}

/// Identity of the consumer holding an address in an AddressPool allocation map
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReferenceWithKind {
    /// Claimant kind
    pub kind: ClaimantKind,

    /// Claimant namespace
    pub namespace: String,

    /// Claimant name
    pub name: String,
}

impl ObjectReferenceWithKind {
    /// Claim held by a cluster (VIP)
    pub fn cluster(reference: &ObjectReference) -> Self {
        Self {
            kind: ClaimantKind::Cluster,
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
        }
    }

    /// Claim held by an inventory (node address)
    pub fn inventory(reference: &ObjectReference) -> Self {
        Self {
            kind: ClaimantKind::Inventory,
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
        }
    }
}

impl fmt::Display for ObjectReferenceWithKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uses_default_namespace_only_when_empty() {
        let local = ObjectReference::new("", "pool-a");
        assert_eq!(local.resolve("metal"), ObjectReference::new("metal", "pool-a"));

        let remote = ObjectReference::new("infra", "pool-a");
        assert_eq!(remote.resolve("metal"), remote);
    }

    #[test]
    fn test_claimant_serializes_kind_as_pascal_case() {
        let node = ObjectReference::new("default", "node-1");
        let claimant = ObjectReferenceWithKind::inventory(&node);
        let json = serde_json::to_value(&claimant).unwrap();
        assert_eq!(json["kind"], "Inventory");
        assert_eq!(json["namespace"], "default");
        assert_eq!(json["name"], "node-1");
    }
}
