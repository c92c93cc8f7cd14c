//! Kubernetes API client
//!
//! Implements `ClusterClientTrait` on top of `kube::Api`. Every request is bounded
//! by a per-call timeout so a stalled API server surfaces as a retryable error
//! instead of blocking the reconcile worker.

use crate::cluster_trait::ClusterClientTrait;
use crate::common::{label_selector, ObjectKey};
use crate::error::ClusterError;
use crds::{Subprocess, SubprocessStatus};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Status fields that are cleared with an explicit `null` in merge patches
const NULLABLE_STATUS_FIELDS: &[&str] = &[
    "observedGeneration",
    "configMapName",
    "deploymentName",
    "error",
    "lastTransitionTime",
];

/// Kubernetes object store client
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    timeout: Duration,
}

impl KubeClusterClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `client` - Connected kube client
    /// * `timeout` - Upper bound for a single API request
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn bounded<T, F>(&self, request: F) -> Result<T, ClusterError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(ClusterError::from),
            Err(_) => Err(ClusterError::Timeout(self.timeout)),
        }
    }

    async fn get_object<K>(&self, key: &ObjectKey) -> Result<Option<K>, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        let api: Api<K> = self.api(&key.namespace);
        self.bounded(api.get_opt(&key.name)).await
    }

    async fn list_objects<K>(&self, namespace: &str, labels: &[(&str, &str)]) -> Result<Vec<K>, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        let api: Api<K> = self.api(namespace);
        let params = ListParams::default().labels(&label_selector(labels));
        let list = self.bounded(api.list(&params)).await?;
        Ok(list.items)
    }

    async fn create_object<K>(&self, namespace: &str, object: &K) -> Result<K, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug,
    {
        let api: Api<K> = self.api(namespace);
        self.bounded(api.create(&PostParams::default(), object)).await
    }

    async fn replace_object<K>(&self, namespace: &str, object: &K) -> Result<K, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug,
    {
        let name = object
            .meta()
            .name
            .clone()
            .ok_or_else(|| ClusterError::Invalid(format!("{} without a name", K::kind(&()))))?;
        let api: Api<K> = self.api(namespace);
        self.bounded(api.replace(&name, &PostParams::default(), object)).await
    }

    async fn delete_object<K>(&self, key: &ObjectKey) -> Result<(), ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        let api: Api<K> = self.api(&key.namespace);
        self.bounded(api.delete(&key.name, &DeleteParams::background()))
            .await?;
        debug!("Deleted {} {}", K::kind(&()), key);
        Ok(())
    }
}

/// Build the merge patch body for a full status write
fn status_patch(status: &SubprocessStatus) -> Result<Value, ClusterError> {
    let mut body = serde_json::to_value(status)?;
    if let Value::Object(fields) = &mut body {
        for field in NULLABLE_STATUS_FIELDS {
            fields.entry(field.to_string()).or_insert(Value::Null);
        }
    }
    Ok(json!({ "status": body }))
}

/// Build the merge patch body for a finalizer list write
fn finalizers_patch(finalizers: &[String], resource_version: Option<&str>) -> Value {
    let mut metadata = Map::new();
    metadata.insert("finalizers".to_string(), json!(finalizers));
    if let Some(version) = resource_version {
        metadata.insert("resourceVersion".to_string(), json!(version));
    }
    json!({ "metadata": metadata })
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_subprocess(&self, key: &ObjectKey) -> Result<Option<Subprocess>, ClusterError> {
        self.get_object(key).await
    }

    async fn replace_subprocess_finalizers(&self, key: &ObjectKey, finalizers: &[String], resource_version: Option<&str>) -> Result<Subprocess, ClusterError> {
        let api: Api<Subprocess> = self.api(&key.namespace);
        let patch = finalizers_patch(finalizers, resource_version);
        self.bounded(api.patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch)))
            .await
    }

    async fn patch_subprocess_status(&self, key: &ObjectKey, status: &SubprocessStatus) -> Result<(), ClusterError> {
        let api: Api<Subprocess> = self.api(&key.namespace);
        let patch = status_patch(status)?;
        self.bounded(api.patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch)))
            .await?;
        Ok(())
    }

    async fn get_config_map(&self, key: &ObjectKey) -> Result<Option<ConfigMap>, ClusterError> {
        self.get_object(key).await
    }

    async fn list_config_maps(&self, namespace: &str, labels: &[(&str, &str)]) -> Result<Vec<ConfigMap>, ClusterError> {
        self.list_objects(namespace, labels).await
    }

    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, ClusterError> {
        self.create_object(namespace, config_map).await
    }

    async fn replace_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, ClusterError> {
        self.replace_object(namespace, config_map).await
    }

    async fn delete_config_map(&self, key: &ObjectKey) -> Result<(), ClusterError> {
        self.delete_object::<ConfigMap>(key).await
    }

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Deployment>, ClusterError> {
        self.get_object(key).await
    }

    async fn list_deployments(&self, namespace: &str, labels: &[(&str, &str)]) -> Result<Vec<Deployment>, ClusterError> {
        self.list_objects(namespace, labels).await
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        self.create_object(namespace, deployment).await
    }

    async fn replace_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        self.replace_object(namespace, deployment).await
    }

    async fn delete_deployment(&self, key: &ObjectKey) -> Result<(), ClusterError> {
        self.delete_object::<Deployment>(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::SubprocessPhase;

    #[test]
    fn test_status_patch_clears_absent_fields() {
        let status = SubprocessStatus {
            phase: SubprocessPhase::Active,
            replicas: 2,
            config_map_name: Some("demo-supervisor-config".to_string()),
            ..Default::default()
        };
        let patch = status_patch(&status).unwrap();
        assert_eq!(patch["status"]["phase"], "Active");
        assert_eq!(patch["status"]["replicas"], 2);
        assert_eq!(patch["status"]["configMapName"], "demo-supervisor-config");
        assert!(patch["status"]["error"].is_null());
        assert!(patch["status"].as_object().unwrap().contains_key("error"));
    }

    #[test]
    fn test_finalizers_patch_carries_resource_version() {
        let finalizers = vec!["webapp.my.domain/finalizer".to_string()];
        let patch = finalizers_patch(&finalizers, Some("42"));
        assert_eq!(patch["metadata"]["finalizers"][0], "webapp.my.domain/finalizer");
        assert_eq!(patch["metadata"]["resourceVersion"], "42");

        let patch = finalizers_patch(&[], None);
        assert_eq!(patch["metadata"]["finalizers"], json!([]));
        assert!(patch["metadata"].get("resourceVersion").is_none());
    }
}
