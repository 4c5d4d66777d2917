//! Controller-specific error types.
//!
//! The variants follow the failure taxonomy the reconcilers work with:
//! dependencies that are not ready yet, optimistic-concurrency conflicts,
//! exhausted pools, missing objects and an unavailable store. The error
//! policy in `watcher.rs` picks a requeue delay from the variant.

use crate::allocator::AllocationError;
use kube::Error as KubeError;
use std::time::Duration;
use store_client::StoreError;
use thiserror::Error;

/// Requeue delay after an optimistic-concurrency conflict
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Errors that can occur in the metal controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A dependency is not satisfied yet (pool or inventory not ready)
    #[error("Not yet ready: {0}")]
    NotYetReady(String),

    /// Stale write or a concurrent claim; re-read and retry
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No free address left in a pool
    #[error("Address pool exhausted: {0}")]
    PoolExhausted(String),

    /// Requested static address is held by another claimant or out of range
    #[error("Address conflict: {0}")]
    AddressConflict(String),

    /// Referenced object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store timed out or is temporarily unreachable
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Any other store error
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Resource watch or serving failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl From<StoreError> for ControllerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ControllerError::NotFound(what),
            StoreError::Conflict(what) => ControllerError::Conflict(what),
            StoreError::Timeout(what) | StoreError::Unavailable(what) => {
                ControllerError::StoreUnavailable(what)
            }
            other => ControllerError::Store(other),
        }
    }
}

impl From<AllocationError> for ControllerError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::PoolExhausted => ControllerError::PoolExhausted(err.to_string()),
            AllocationError::AddressConflict { .. }
            | AllocationError::ClaimantHoldsOther { .. }
            | AllocationError::OutOfRange(_)
            | AllocationError::InvalidAddress(_) => {
                ControllerError::AddressConflict(err.to_string())
            }
            AllocationError::InvalidPool(msg) => ControllerError::InvalidConfig(msg),
        }
    }
}

impl ControllerError {
    /// Retriable without operator action: waiting, conflicts and store outages
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ControllerError::NotYetReady(_)
                | ControllerError::Conflict(_)
                | ControllerError::StoreUnavailable(_)
        )
    }

    /// Fixed requeue delay for this error, `None` when the per-resource
    /// backoff should decide
    pub fn requeue_after(&self, not_ready: Duration) -> Option<Duration> {
        match self {
            ControllerError::NotYetReady(_) => Some(not_ready),
            ControllerError::Conflict(_) => Some(CONFLICT_REQUEUE),
            _ => None,
        }
    }
}
