//! Controller-specific error types.
//!
//! This module defines error types specific to the Subprocess Controller
//! that are not covered by upstream library errors.

use cluster_client::ClusterError;
use thiserror::Error;

/// Errors that can occur in the Subprocess Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Subprocess spec cannot be turned into a supervisor configuration
    #[error("Invalid Subprocess spec: {0}")]
    InvalidSpec(String),

    /// Some dependents could not be deleted; the finalizer stays in place
    #[error("Cleanup incomplete: deleted {deleted}, failed to delete {}", .failed.join(", "))]
    PartialCleanup { deleted: usize, failed: Vec<String> },

    /// A write kept losing optimistic-concurrency races
    #[error("Conflict retries exhausted: {0}")]
    ConflictRetriesExhausted(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Check if reconciling again may succeed without a spec change
    pub fn is_retryable(&self) -> bool {
        match self {
            ControllerError::Cluster(e) => e.is_retryable(),
            ControllerError::PartialCleanup { .. } | ControllerError::ConflictRetriesExhausted(_) => true,
            ControllerError::InvalidSpec(_) | ControllerError::InvalidConfig(_) | ControllerError::Watch(_) => false,
        }
    }
}
