//! Cluster client errors

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API server
///
/// API responses that the controller reacts to (404, 409, 400/422, 429/5xx)
/// are lifted into dedicated variants so callers never inspect status codes.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write lost an optimistic-concurrency race, or the object already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// API server rejected the object as invalid
    #[error("Invalid object: {0}")]
    Invalid(String),

    /// API server is overloaded or failing (429, 5xx)
    #[error("API server unavailable: {0}")]
    Unavailable(String),

    /// Request did not complete within the client timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other Kubernetes client error (transport, auth, config)
    #[error("Kubernetes error: {0}")]
    Kube(kube::Error),
}

impl From<kube::Error> for ClusterError {
    fn from(error: kube::Error) -> Self {
        let response = match &error {
            kube::Error::Api(response) => Some((response.code, response.message.clone())),
            _ => None,
        };
        match response {
            Some((404, message)) => ClusterError::NotFound(message),
            Some((409, message)) => ClusterError::Conflict(message),
            Some((400 | 422, message)) => ClusterError::Invalid(message),
            Some((429 | 500..=599, message)) => ClusterError::Unavailable(message),
            _ => ClusterError::Kube(error),
        }
    }
}

impl ClusterError {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    /// Check if this error is an optimistic-concurrency or already-exists conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict(_))
    }

    /// Check if the failed call may succeed when retried
    pub fn is_retryable(&self) -> bool {
        match self {
            ClusterError::Conflict(_) | ClusterError::Unavailable(_) | ClusterError::Timeout(_) => true,
            ClusterError::NotFound(_) | ClusterError::Invalid(_) | ClusterError::Serialization(_) => false,
            // 401/403 and other unmapped 4xx; 429 and 5xx are already Unavailable
            ClusterError::Kube(kube::Error::Api(_)) => false,
            ClusterError::Kube(kube::Error::SerdeError(_) | kube::Error::BuildRequest(_)) => false,
            ClusterError::Kube(_) => true,
        }
    }
}
