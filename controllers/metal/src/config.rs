//! Controller configuration from environment variables.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::time::Duration;

/// Runtime settings for the metal controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Restrict watchers to one namespace (`None` watches all namespaces)
    pub namespace: Option<String>,
    /// Requeue delay after a successful pass
    pub resync_interval: Duration,
    /// Deadline on every store call
    pub store_timeout: Duration,
    /// Requeue delay while a dependency is not ready
    pub not_ready_requeue: Duration,
    /// Concurrent reconciliations per resource kind
    pub concurrency: u16,
    /// Listen address for `/metrics`, `/healthz` and `/readyz`
    pub metrics_addr: SocketAddr,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            resync_interval: Duration::from_secs(300),
            store_timeout: Duration::from_secs(30),
            not_ready_requeue: Duration::from_secs(15),
            concurrency: 3,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let seconds = |key: &str, default: Duration| -> Result<Duration, ControllerError> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| ControllerError::InvalidConfig(format!("{}={}: {}", key, raw, e))),
                None => Ok(default),
            }
        };

        let concurrency = match lookup("RECONCILE_CONCURRENCY") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                ControllerError::InvalidConfig(format!("RECONCILE_CONCURRENCY={}: {}", raw, e))
            })?,
            None => defaults.concurrency,
        };
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        let metrics_addr = match lookup("METRICS_ADDR") {
            Some(raw) => raw.trim().parse::<SocketAddr>().map_err(|e| {
                ControllerError::InvalidConfig(format!("METRICS_ADDR={}: {}", raw, e))
            })?,
            None => defaults.metrics_addr,
        };

        Ok(Self {
            namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            resync_interval: seconds("RESYNC_INTERVAL_SECS", defaults.resync_interval)?,
            store_timeout: seconds("STORE_TIMEOUT_SECS", defaults.store_timeout)?,
            not_ready_requeue: seconds("NOT_READY_REQUEUE_SECS", defaults.not_ready_requeue)?,
            concurrency,
            metrics_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ControllerConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = ControllerConfig::from_lookup(env(&[
            ("WATCH_NAMESPACE", "metal"),
            ("RESYNC_INTERVAL_SECS", "60"),
            ("NOT_READY_REQUEUE_SECS", "5"),
            ("RECONCILE_CONCURRENCY", "8"),
            ("METRICS_ADDR", "127.0.0.1:9090"),
        ]))
        .unwrap();
        assert_eq!(config.namespace.as_deref(), Some("metal"));
        assert_eq!(config.resync_interval, Duration::from_secs(60));
        assert_eq!(config.not_ready_requeue, Duration::from_secs(5));
        assert_eq!(config.store_timeout, Duration::from_secs(30));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.metrics_addr, SocketAddr::from(([127, 0, 0, 1], 9090)));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            ControllerConfig::from_lookup(env(&[("STORE_TIMEOUT_SECS", "soon")])),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            ControllerConfig::from_lookup(env(&[("RECONCILE_CONCURRENCY", "0")])),
            Err(ControllerError::InvalidConfig(_))
        ));
    }
}
