//! Store client errors

use thiserror::Error;

/// Errors that can occur when talking to the declarative object store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency check failed or the object already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Call did not complete within the configured deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Store is temporarily unreachable or overloaded
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Object cannot be written as given (e.g. missing name)
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl StoreError {
    /// Classify a kube error for the object described by `what`
    pub fn from_kube(err: kube::Error, what: &str) -> Self {
        let code = match &err {
            kube::Error::Api(resp) => Some(resp.code),
            _ => None,
        };
        match code {
            Some(404) => StoreError::NotFound(what.to_string()),
            Some(409) => StoreError::Conflict(format!("{}: {}", what, err)),
            Some(c) if c == 429 || c >= 500 => {
                StoreError::Unavailable(format!("{}: {}", what, err))
            }
            _ => StoreError::Kube(err),
        }
    }

    /// Object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Stale write or create of an existing object
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// Transient failures worth a backoff-scheduled retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout(_) | StoreError::Unavailable(_) | StoreError::Kube(_)
        )
    }
}
