//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of `ClusterClientTrait` that
//! behaves like the API server where the reconciler can observe the difference:
//! resource versions are checked on replace, creates of existing objects conflict,
//! and an object with a deletion timestamp disappears once its last finalizer is removed.
//!
//! The mock is organized into domain-specific modules:
//! - `subprocess.rs` - Subprocess reads, finalizer writes, status writes
//! - `workloads.rs` - ConfigMap and Deployment CRUD
//!
//! Failures are injected per operation with [`MockClusterClient::fail_next`] and
//! [`MockClusterClient::fail_on`]; each injected fault fires once.

mod subprocess;
mod workloads;

use crate::cluster_trait::ClusterClientTrait;
use crate::common::ObjectKey;
use crate::error::ClusterError;
use crds::{Subprocess, SubprocessSpec, SubprocessStatus};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::Resource;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Operations recorded by the mock, one per trait method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    GetSubprocess,
    ReplaceFinalizers,
    PatchStatus,
    GetConfigMap,
    ListConfigMaps,
    CreateConfigMap,
    ReplaceConfigMap,
    DeleteConfigMap,
    GetDeployment,
    ListDeployments,
    CreateDeployment,
    ReplaceDeployment,
    DeleteDeployment,
}

impl MockOperation {
    /// Whether the operation mutates the store
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            MockOperation::GetSubprocess
                | MockOperation::GetConfigMap
                | MockOperation::ListConfigMaps
                | MockOperation::GetDeployment
                | MockOperation::ListDeployments
        )
    }
}

/// Failure to inject into a mock operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Conflict,
    Timeout,
    Unavailable,
    NotFound,
    Invalid,
}

impl FaultKind {
    fn into_error(self, operation: MockOperation, target: &str) -> ClusterError {
        let message = format!("injected fault on {:?} {}", operation, target);
        match self {
            FaultKind::Conflict => ClusterError::Conflict(message),
            FaultKind::Timeout => ClusterError::Timeout(Duration::from_secs(30)),
            FaultKind::Unavailable => ClusterError::Unavailable(message),
            FaultKind::NotFound => ClusterError::NotFound(message),
            FaultKind::Invalid => ClusterError::Invalid(message),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Fault {
    operation: MockOperation,
    target: Option<String>,
    kind: FaultKind,
}

/// Mock ClusterClient for testing
///
/// Cloning shares the underlying store, so a test can keep a handle while the
/// reconciler owns another.
#[derive(Clone, Default)]
pub struct MockClusterClient {
    // In-memory storage for resources
    pub(crate) subprocesses: Arc<Mutex<HashMap<ObjectKey, Subprocess>>>,
    pub(crate) config_maps: Arc<Mutex<HashMap<ObjectKey, ConfigMap>>>,
    pub(crate) deployments: Arc<Mutex<HashMap<ObjectKey, Deployment>>>,
    // Pending injected failures, consumed in insertion order
    pub(crate) faults: Arc<Mutex<Vec<Fault>>>,
    // Every call made through the trait, with its target name
    pub(crate) journal: Arc<Mutex<Vec<(MockOperation, String)>>>,
    // Counter for generating resource versions
    pub(crate) resource_version: Arc<Mutex<u64>>,
}

impl MockClusterClient {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the next resource version
    pub(crate) fn next_resource_version(&self) -> String {
        let mut counter = self.resource_version.lock().unwrap();
        *counter += 1;
        counter.to_string()
    }

    /// Journal a call and fire a matching injected fault, if any
    pub(crate) fn record(&self, operation: MockOperation, target: &str) -> Result<(), ClusterError> {
        self.journal
            .lock()
            .unwrap()
            .push((operation, target.to_string()));

        let mut faults = self.faults.lock().unwrap();
        let position = faults.iter().position(|fault| {
            fault.operation == operation
                && fault.target.as_deref().is_none_or(|name| name == target)
        });
        match position {
            Some(index) => Err(faults.remove(index).kind.into_error(operation, target)),
            None => Ok(()),
        }
    }

    // Fault injection

    /// Fail the next call of `operation`, whatever its target
    pub fn fail_next(&self, operation: MockOperation, kind: FaultKind) {
        self.faults.lock().unwrap().push(Fault {
            operation,
            target: None,
            kind,
        });
    }

    /// Fail the next call of `operation` that targets the object named `name`
    pub fn fail_on(&self, operation: MockOperation, name: &str, kind: FaultKind) {
        self.faults.lock().unwrap().push(Fault {
            operation,
            target: Some(name.to_string()),
            kind,
        });
    }

    /// Drop all pending injected faults
    pub fn clear_faults(&self) {
        self.faults.lock().unwrap().clear();
    }

    // Call journal

    /// All calls made through the trait, oldest first
    pub fn operations(&self) -> Vec<(MockOperation, String)> {
        self.journal.lock().unwrap().clone()
    }

    /// Number of calls of one operation
    pub fn operation_count(&self, operation: MockOperation) -> usize {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|(recorded, _)| *recorded == operation)
            .count()
    }

    /// Number of calls that mutate the store
    pub fn write_count(&self) -> usize {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|(operation, _)| operation.is_write())
            .count()
    }

    /// Forget recorded calls
    pub fn clear_operations(&self) {
        self.journal.lock().unwrap().clear();
    }

    // Subprocess store helpers

    /// Seed a Subprocess as if a user had created it
    ///
    /// Assigns a resource version and defaults the namespace to `default` and
    /// the generation to 1.
    pub fn add_subprocess(&self, mut subprocess: Subprocess) -> Subprocess {
        let meta = subprocess.meta_mut();
        meta.namespace.get_or_insert_with(|| "default".to_string());
        meta.generation.get_or_insert(1);
        meta.resource_version = Some(self.next_resource_version());
        let key = ObjectKey::for_resource(&subprocess)
            .unwrap_or_else(|| ObjectKey::new("default", ""));
        self.subprocesses
            .lock()
            .unwrap()
            .insert(key, subprocess.clone());
        subprocess
    }

    /// Current stored Subprocess
    pub fn subprocess(&self, key: &ObjectKey) -> Option<Subprocess> {
        self.subprocesses.lock().unwrap().get(key).cloned()
    }

    /// Replace a Subprocess spec as a user edit would, bumping its generation
    pub fn update_subprocess_spec(&self, key: &ObjectKey, spec: SubprocessSpec) {
        let resource_version = self.next_resource_version();
        if let Some(subprocess) = self.subprocesses.lock().unwrap().get_mut(key) {
            subprocess.spec = spec;
            let meta = subprocess.meta_mut();
            meta.generation = Some(meta.generation.unwrap_or(0) + 1);
            meta.resource_version = Some(resource_version);
        }
    }

    /// Request deletion of a Subprocess
    ///
    /// Objects holding finalizers get a deletion timestamp; others are removed.
    pub fn request_subprocess_deletion(&self, key: &ObjectKey) {
        let resource_version = self.next_resource_version();
        let mut subprocesses = self.subprocesses.lock().unwrap();
        let has_finalizers = subprocesses
            .get(key)
            .and_then(|subprocess| subprocess.meta().finalizers.as_ref())
            .is_some_and(|finalizers| !finalizers.is_empty());
        if !has_finalizers {
            subprocesses.remove(key);
            return;
        }
        if let Some(subprocess) = subprocesses.get_mut(key) {
            let meta = subprocess.meta_mut();
            if meta.deletion_timestamp.is_none() {
                meta.deletion_timestamp = Some(deletion_time());
            }
            meta.resource_version = Some(resource_version);
        }
    }

    /// Status currently stored on a Subprocess
    pub fn subprocess_status(&self, key: &ObjectKey) -> Option<SubprocessStatus> {
        self.subprocess(key).and_then(|subprocess| subprocess.status)
    }

    // Workload store helpers

    /// Insert a ConfigMap directly, bypassing fault injection and the journal
    pub fn insert_config_map(&self, mut config_map: ConfigMap) {
        config_map.metadata.resource_version = Some(self.next_resource_version());
        if let Some(key) = ObjectKey::for_resource(&config_map) {
            self.config_maps.lock().unwrap().insert(key, config_map);
        }
    }

    /// Insert a Deployment directly, bypassing fault injection and the journal
    pub fn insert_deployment(&self, mut deployment: Deployment) {
        deployment.metadata.resource_version = Some(self.next_resource_version());
        if let Some(key) = ObjectKey::for_resource(&deployment) {
            self.deployments.lock().unwrap().insert(key, deployment);
        }
    }

    /// Current stored ConfigMap
    pub fn config_map(&self, key: &ObjectKey) -> Option<ConfigMap> {
        self.config_maps.lock().unwrap().get(key).cloned()
    }

    /// Current stored Deployment
    pub fn deployment(&self, key: &ObjectKey) -> Option<Deployment> {
        self.deployments.lock().unwrap().get(key).cloned()
    }

    /// All stored ConfigMaps, ordered by key
    pub fn config_maps(&self) -> Vec<ConfigMap> {
        workloads::sorted_values(&self.config_maps)
    }

    /// All stored Deployments, ordered by key
    pub fn deployments(&self) -> Vec<Deployment> {
        workloads::sorted_values(&self.deployments)
    }

    /// Change a Deployment's replica count as an out-of-band edit would
    pub fn scale_deployment(&self, key: &ObjectKey, replicas: i32) {
        let resource_version = self.next_resource_version();
        if let Some(deployment) = self.deployments.lock().unwrap().get_mut(key) {
            if let Some(spec) = deployment.spec.as_mut() {
                spec.replicas = Some(replicas);
            }
            deployment.metadata.resource_version = Some(resource_version);
        }
    }

    /// Report `ready` ready replicas on a Deployment, as its pods coming up would
    pub fn mark_deployment_ready(&self, key: &ObjectKey, ready: i32) {
        let resource_version = self.next_resource_version();
        if let Some(deployment) = self.deployments.lock().unwrap().get_mut(key) {
            let status = deployment.status.get_or_insert_with(DeploymentStatus::default);
            status.replicas = Some(ready);
            status.ready_replicas = Some(ready);
            deployment.metadata.resource_version = Some(resource_version);
        }
    }
}

fn deletion_time() -> Time {
    serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z"))
        .unwrap_or_else(|_| Time(Default::default()))
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_subprocess(&self, key: &ObjectKey) -> Result<Option<Subprocess>, ClusterError> {
        subprocess::get_subprocess(self, key).await
    }

    async fn replace_subprocess_finalizers(&self, key: &ObjectKey, finalizers: &[String], resource_version: Option<&str>) -> Result<Subprocess, ClusterError> {
        subprocess::replace_subprocess_finalizers(self, key, finalizers, resource_version).await
    }

    async fn patch_subprocess_status(&self, key: &ObjectKey, status: &SubprocessStatus) -> Result<(), ClusterError> {
        subprocess::patch_subprocess_status(self, key, status).await
    }

    async fn get_config_map(&self, key: &ObjectKey) -> Result<Option<ConfigMap>, ClusterError> {
        workloads::get_config_map(self, key).await
    }

    async fn list_config_maps(&self, namespace: &str, labels: &[(&str, &str)]) -> Result<Vec<ConfigMap>, ClusterError> {
        workloads::list_config_maps(self, namespace, labels).await
    }

    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, ClusterError> {
        workloads::create_config_map(self, namespace, config_map).await
    }

    async fn replace_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, ClusterError> {
        workloads::replace_config_map(self, namespace, config_map).await
    }

    async fn delete_config_map(&self, key: &ObjectKey) -> Result<(), ClusterError> {
        workloads::delete_config_map(self, key).await
    }

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Deployment>, ClusterError> {
        workloads::get_deployment(self, key).await
    }

    async fn list_deployments(&self, namespace: &str, labels: &[(&str, &str)]) -> Result<Vec<Deployment>, ClusterError> {
        workloads::list_deployments(self, namespace, labels).await
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        workloads::create_deployment(self, namespace, deployment).await
    }

    async fn replace_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        workloads::replace_deployment(self, namespace, deployment).await
    }

    async fn delete_deployment(&self, key: &ObjectKey) -> Result<(), ClusterError> {
        workloads::delete_deployment(self, key).await
    }
}
