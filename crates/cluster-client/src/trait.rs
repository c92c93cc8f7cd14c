//! ClusterClient trait for mocking
//!
//! This trait abstracts the Kubernetes object store to enable mocking in unit tests.
//! `KubeClusterClient` implements it against a live API server and
//! `MockClusterClient` (feature `test-util`) keeps objects in memory.

use crate::common::ObjectKey;
use crate::error::ClusterError;
use crds::{Subprocess, SubprocessStatus};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;

/// Object store operations used by the Subprocess reconciler
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Write operations that take a whole object rely on its `metadata.resourceVersion`
/// for optimistic concurrency and fail with `ClusterError::Conflict` when stale.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // Subprocess operations
    async fn get_subprocess(&self, key: &ObjectKey) -> Result<Option<Subprocess>, ClusterError>;
    async fn replace_subprocess_finalizers(&self, key: &ObjectKey, finalizers: &[String], resource_version: Option<&str>) -> Result<Subprocess, ClusterError>;
    async fn patch_subprocess_status(&self, key: &ObjectKey, status: &SubprocessStatus) -> Result<(), ClusterError>;

    // ConfigMap operations
    async fn get_config_map(&self, key: &ObjectKey) -> Result<Option<ConfigMap>, ClusterError>;
    async fn list_config_maps(&self, namespace: &str, labels: &[(&str, &str)]) -> Result<Vec<ConfigMap>, ClusterError>;
    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, ClusterError>;
    async fn replace_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, ClusterError>;
    async fn delete_config_map(&self, key: &ObjectKey) -> Result<(), ClusterError>;

    // Deployment operations
    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Deployment>, ClusterError>;
    async fn list_deployments(&self, namespace: &str, labels: &[(&str, &str)]) -> Result<Vec<Deployment>, ClusterError>;
    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError>;
    async fn replace_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError>;
    async fn delete_deployment(&self, key: &ObjectKey) -> Result<(), ClusterError>;
}
