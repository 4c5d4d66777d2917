//! Condition ledger
//!
//! Ordered, de-duplicated log of typed state markers attached to Inventory and
//! Cluster status. Every multi-step reconciler records completed steps here and
//! gates re-entry on [`Conditions::exists`], so a retried pass never re-runs a
//! side effect that is already recorded.
//!
//! At most one condition of a given type is present. Updating an existing type
//! keeps its position and its first-observed time.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Condition type tags understood by the controllers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionType {
    /// BaseboardManagement object submitted to the BMC collaborator
    #[serde(rename = "bmcTaskSubmitted")]
    BmcTaskSubmitted,
    /// BMC reported the machine contactable
    #[serde(rename = "bmcTaskCompleted")]
    BmcTaskCompleted,
    /// BMC reported an error
    #[serde(rename = "bmcTaskError")]
    BmcTaskError,
    /// Hardware descriptor created or updated for this machine
    #[serde(rename = "tinkWorkflowCreated")]
    TinkWorkflowCreated,
    /// Hardware descriptor could not be handed off
    #[serde(rename = "tinkWorkflowError")]
    TinkWorkflowError,
    /// Inventory bound to a cluster with resolved network parameters
    #[serde(rename = "allocatedToCluster")]
    AllocatedToCluster,
    /// Inventory released from a cluster
    #[serde(rename = "inventoryFreed")]
    Freed,
    /// First node of a cluster; bootstraps it
    #[serde(rename = "create-mode")]
    CreateMode,
    /// Subsequent node of a cluster; joins it
    #[serde(rename = "join-mode")]
    JoinMode,
    /// Reconciliation is waiting on a dependency that is not ready yet
    #[serde(rename = "waitingForDependencies")]
    WaitingForDependencies,
    /// Last reconciliation pass failed
    #[serde(rename = "reconcileError")]
    ReconcileError,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // serde names are the canonical spelling
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

/// A typed, timestamped status fact
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: ConditionType,

    /// When this condition type was first observed
    pub start_time: DateTime<Utc>,

    /// When this condition was last updated
    pub last_update_time: DateTime<Utc>,

    /// Human readable detail
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Ordered condition log
///
/// Deserialisation goes through [`From<Vec<Condition>>`], so a stored list
/// with repeated types loads with one condition per type.
#[derive(Debug, Clone, Serialize, JsonSchema, PartialEq, Default)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl<'de> Deserialize<'de> for Conditions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Condition>::deserialize(deserializer).map(Self::from)
    }
}

impl Conditions {
    /// Empty ledger
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create or update the condition of type `type_` using the current time
    pub fn create_or_update(&mut self, type_: ConditionType, message: impl Into<String>) {
        self.create_or_update_at(type_, message, Utc::now());
    }

    /// Create or update the condition of type `type_` as of `now`
    ///
    /// An existing condition keeps its position and `start_time`; only the
    /// message and `last_update_time` change. Otherwise a new condition is
    /// appended with both timestamps set to `now`.
    pub fn create_or_update_at(
        &mut self,
        type_: ConditionType,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let message = message.into();
        if let Some(existing) = self.0.iter_mut().find(|c| c.type_ == type_) {
            existing.message = message;
            existing.last_update_time = now;
            return;
        }
        self.0.push(Condition {
            type_,
            start_time: now,
            last_update_time: now,
            message,
        });
    }

    /// Remove the condition of type `type_`, if present
    pub fn remove(&mut self, type_: ConditionType) {
        self.0.retain(|c| c.type_ != type_);
    }

    /// Whether a condition of type `type_` is present
    pub fn exists(&self, type_: ConditionType) -> bool {
        self.0.iter().any(|c| c.type_ == type_)
    }

    /// Look up the condition of type `type_`
    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    /// Drop every condition
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no condition is recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(mut conditions: Vec<Condition>) -> Self {
        // keep the first occurrence of each type
        let mut seen = Vec::new();
        conditions.retain(|c| {
            if seen.contains(&c.type_) {
                false
            } else {
                seen.push(c.type_);
                true
            }
        });
        Self(conditions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_create_appends_new_type() {
        let mut conditions = Conditions::new();
        conditions.create_or_update_at(ConditionType::BmcTaskSubmitted, "submitted", t(0));
        conditions.create_or_update_at(ConditionType::BmcTaskCompleted, "done", t(5));

        let types: Vec<_> = conditions.iter().map(|c| c.type_).collect();
        assert_eq!(types, vec![ConditionType::BmcTaskSubmitted, ConditionType::BmcTaskCompleted]);
        assert_eq!(conditions.get(ConditionType::BmcTaskCompleted).unwrap().start_time, t(5));
    }

    #[test]
    fn test_repeated_updates_keep_single_condition() {
        let mut conditions = Conditions::new();
        conditions.create_or_update_at(ConditionType::AllocatedToCluster, "first", t(0));
        conditions.create_or_update_at(ConditionType::JoinMode, "Join Mode", t(1));
        conditions.create_or_update_at(ConditionType::AllocatedToCluster, "second", t(10));
        conditions.create_or_update_at(ConditionType::AllocatedToCluster, "third", t(20));

        assert_eq!(conditions.len(), 2);
        let allocated = conditions.get(ConditionType::AllocatedToCluster).unwrap();
        assert_eq!(allocated.message, "third");
        assert_eq!(allocated.start_time, t(0));
        assert_eq!(allocated.last_update_time, t(20));
        // position preserved
        assert_eq!(conditions.iter().next().unwrap().type_, ConditionType::AllocatedToCluster);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut conditions = Conditions::new();
        conditions.create_or_update_at(ConditionType::Freed, "released", t(0));
        conditions.remove(ConditionType::Freed);
        conditions.remove(ConditionType::Freed);
        assert!(conditions.is_empty());
        assert!(!conditions.exists(ConditionType::Freed));
    }

    #[test]
    fn test_serialized_names() {
        let mut conditions = Conditions::new();
        conditions.create_or_update_at(ConditionType::CreateMode, "Create Mode", t(0));
        let json = serde_json::to_value(&conditions).unwrap();
        assert_eq!(json[0]["type"], "create-mode");
        assert_eq!(json[0]["message"], "Create Mode");
        assert_eq!(ConditionType::TinkWorkflowCreated.to_string(), "tinkWorkflowCreated");
    }

    #[test]
    fn test_from_vec_drops_duplicate_types() {
        let duplicate = Condition {
            type_: ConditionType::BmcTaskError,
            start_time: t(0),
            last_update_time: t(0),
            message: "a".to_string(),
        };
        let mut second = duplicate.clone();
        second.message = "b".to_string();

        let conditions = Conditions::from(vec![duplicate, second]);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions.get(ConditionType::BmcTaskError).unwrap().message, "a");
    }

    #[test]
    fn test_stored_duplicates_load_as_one_condition() {
        let json = serde_json::json!([
            {"type": "allocatedToCluster", "startTime": "2024-01-01T00:00:00Z",
             "lastUpdateTime": "2024-01-01T00:00:00Z", "message": "c1"},
            {"type": "join-mode", "startTime": "2024-01-01T00:00:00Z",
             "lastUpdateTime": "2024-01-01T00:00:00Z", "message": "Join Mode"},
            {"type": "allocatedToCluster", "startTime": "2024-01-02T00:00:00Z",
             "lastUpdateTime": "2024-01-02T00:00:00Z", "message": "c2"}
        ]);

        let mut conditions: Conditions = serde_json::from_value(json).unwrap();
        assert_eq!(conditions.len(), 2);

        conditions.create_or_update_at(ConditionType::AllocatedToCluster, "c3", t(0));
        conditions.remove(ConditionType::JoinMode);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions.get(ConditionType::AllocatedToCluster).unwrap().message, "c3");
    }
}
