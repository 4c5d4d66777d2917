//! BaseboardManagement CRD (bmc.tinkerbell.org)
//!
//! Typed mirror of the BMC collaborator's resource. The Inventory controller
//! creates one per Inventory and only reads its status back.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type the BMC collaborator uses to report reachability
pub const CONTACTABLE_CONDITION: &str = "Contactable";

const NOT_CONTACTABLE: &str = "baseboard management controller not contactable";

/// Desired state of one BMC
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "bmc.tinkerbell.org",
    version = "v1alpha1",
    kind = "BaseboardManagement",
    namespaced,
    status = "BaseboardManagementStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BaseboardManagementSpec {
    /// Out-of-band connection details
    pub connection: Connection,

    /// Desired power state (left to the BMC collaborator when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerState>,
}

/// BMC connection descriptor
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// BMC host name or address
    pub host: String,

    /// BMC port
    #[serde(default = "default_bmc_port")]
    pub port: u16,

    /// Skip TLS verification when talking to the BMC
    #[serde(default, rename = "insecureTLS")]
    pub insecure_tls: bool,

    /// Secret holding the BMC username and password
    pub auth_secret_ref: SecretReference,
}

fn default_bmc_port() -> u16 {
    623
}

/// Reference to a credentials secret
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Secret name
    pub name: String,

    /// Secret namespace
    #[serde(default)]
    pub namespace: String,
}

/// Machine power state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// Powered on
    On,
    /// Powered off
    Off,
}

/// Observed BMC state
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BaseboardManagementStatus {
    /// Observed power state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerState>,

    /// Conditions reported by the BMC collaborator
    #[serde(default)]
    pub conditions: Vec<BaseboardCondition>,
}

/// Condition reported by the BMC collaborator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BaseboardCondition {
    /// Condition type, e.g. `Contactable`
    #[serde(rename = "type")]
    pub type_: String,

    /// "True" or "False"
    pub status: String,

    /// Failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of the BMC task as far as this controller cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BmcTaskOutcome {
    /// No verdict yet
    Pending,
    /// Machine is reachable out of band
    Completed,
    /// BMC collaborator reported a failure
    Failed(String),
}

impl BaseboardManagementStatus {
    /// Interpret the `Contactable` condition
    pub fn task_outcome(&self) -> BmcTaskOutcome {
        match self.conditions.iter().find(|c| c.type_ == CONTACTABLE_CONDITION) {
            None => BmcTaskOutcome::Pending,
            Some(c) if c.status.eq_ignore_ascii_case("true") => BmcTaskOutcome::Completed,
            Some(c) => BmcTaskOutcome::Failed(
                c.message.clone().unwrap_or_else(|| NOT_CONTACTABLE.to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_with(status: &str, message: Option<&str>) -> BaseboardManagementStatus {
        BaseboardManagementStatus {
            power: None,
            conditions: vec![BaseboardCondition {
                type_: CONTACTABLE_CONDITION.to_string(),
                status: status.to_string(),
                message: message.map(str::to_string),
            }],
        }
    }

    #[test]
    fn test_task_outcome() {
        assert_eq!(BaseboardManagementStatus::default().task_outcome(), BmcTaskOutcome::Pending);
        assert_eq!(status_with("True", None).task_outcome(), BmcTaskOutcome::Completed);
        assert_eq!(
            status_with("False", Some("connection refused")).task_outcome(),
            BmcTaskOutcome::Failed("connection refused".to_string())
        );
    }

    #[test]
    fn test_connection_defaults() {
        let conn: Connection = serde_json::from_value(serde_json::json!({
            "host": "10.0.0.5",
            "authSecretRef": {"name": "bmc-creds"}
        }))
        .unwrap();
        assert_eq!(conn.port, 623);
        assert!(!conn.insecure_tls);
    }
}
