//! ConfigMap and Deployment operations for MockClusterClient

use super::{MockClusterClient, MockOperation};
use crate::common::{matches_labels, ObjectKey};
use crate::error::ClusterError;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Resource;
use std::collections::HashMap;
use std::sync::Mutex;

type Store<K> = Mutex<HashMap<ObjectKey, K>>;

pub(crate) fn sorted_values<K: Clone>(store: &Store<K>) -> Vec<K> {
    let store = store.lock().unwrap();
    let mut keys: Vec<&ObjectKey> = store.keys().collect();
    keys.sort();
    keys.into_iter().filter_map(|key| store.get(key).cloned()).collect()
}

fn list<K: Resource + Clone>(store: &Store<K>, namespace: &str, labels: &[(&str, &str)]) -> Vec<K> {
    sorted_values(store)
        .into_iter()
        .filter(|object| object.meta().namespace.as_deref() == Some(namespace))
        .filter(|object| matches_labels(object.meta().labels.as_ref(), labels))
        .collect()
}

fn object_name<K: Resource>(object: &K, kind: &str) -> Result<String, ClusterError> {
    object
        .meta()
        .name
        .clone()
        .ok_or_else(|| ClusterError::Invalid(format!("{} without a name", kind)))
}

fn create<K: Resource + Clone>(
    client: &MockClusterClient,
    store: &Store<K>,
    kind: &str,
    namespace: &str,
    object: &K,
) -> Result<K, ClusterError> {
    let key = ObjectKey::new(namespace, object_name(object, kind)?);
    let mut created = object.clone();
    created.meta_mut().namespace = Some(namespace.to_string());
    created.meta_mut().resource_version = Some(client.next_resource_version());

    let mut store = store.lock().unwrap();
    if store.contains_key(&key) {
        return Err(ClusterError::Conflict(format!("{} {} already exists", kind, key)));
    }
    store.insert(key, created.clone());
    Ok(created)
}

fn replace<K: Resource + Clone>(
    client: &MockClusterClient,
    store: &Store<K>,
    kind: &str,
    namespace: &str,
    object: &K,
    keep_from_stored: impl FnOnce(&K, &mut K),
) -> Result<K, ClusterError> {
    let key = ObjectKey::new(namespace, object_name(object, kind)?);
    let next_version = client.next_resource_version();

    let mut store = store.lock().unwrap();
    let stored = store
        .get(&key)
        .ok_or_else(|| ClusterError::NotFound(format!("{} {} not found", kind, key)))?;
    if let Some(expected) = object.meta().resource_version.as_deref() {
        if stored.meta().resource_version.as_deref() != Some(expected) {
            return Err(ClusterError::Conflict(format!(
                "{} {} has been modified (expected resourceVersion {})",
                kind, key, expected
            )));
        }
    }

    let mut replaced = object.clone();
    keep_from_stored(stored, &mut replaced);
    replaced.meta_mut().namespace = Some(namespace.to_string());
    replaced.meta_mut().resource_version = Some(next_version);
    store.insert(key, replaced.clone());
    Ok(replaced)
}

fn delete<K>(store: &Store<K>, kind: &str, key: &ObjectKey) -> Result<(), ClusterError> {
    store
        .lock()
        .unwrap()
        .remove(key)
        .map(|_| ())
        .ok_or_else(|| ClusterError::NotFound(format!("{} {} not found", kind, key)))
}

// ConfigMap operations

pub async fn get_config_map(client: &MockClusterClient, key: &ObjectKey) -> Result<Option<ConfigMap>, ClusterError> {
    client.record(MockOperation::GetConfigMap, &key.name)?;
    Ok(client.config_maps.lock().unwrap().get(key).cloned())
}

pub async fn list_config_maps(client: &MockClusterClient, namespace: &str, labels: &[(&str, &str)]) -> Result<Vec<ConfigMap>, ClusterError> {
    client.record(MockOperation::ListConfigMaps, namespace)?;
    Ok(list(&client.config_maps, namespace, labels))
}

pub async fn create_config_map(client: &MockClusterClient, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, ClusterError> {
    client.record(MockOperation::CreateConfigMap, config_map.metadata.name.as_deref().unwrap_or_default())?;
    create(client, &client.config_maps, "ConfigMap", namespace, config_map)
}

pub async fn replace_config_map(client: &MockClusterClient, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, ClusterError> {
    client.record(MockOperation::ReplaceConfigMap, config_map.metadata.name.as_deref().unwrap_or_default())?;
    replace(client, &client.config_maps, "ConfigMap", namespace, config_map, |_, _| {})
}

pub async fn delete_config_map(client: &MockClusterClient, key: &ObjectKey) -> Result<(), ClusterError> {
    client.record(MockOperation::DeleteConfigMap, &key.name)?;
    delete(&client.config_maps, "ConfigMap", key)
}

// Deployment operations

pub async fn get_deployment(client: &MockClusterClient, key: &ObjectKey) -> Result<Option<Deployment>, ClusterError> {
    client.record(MockOperation::GetDeployment, &key.name)?;
    Ok(client.deployments.lock().unwrap().get(key).cloned())
}

pub async fn list_deployments(client: &MockClusterClient, namespace: &str, labels: &[(&str, &str)]) -> Result<Vec<Deployment>, ClusterError> {
    client.record(MockOperation::ListDeployments, namespace)?;
    Ok(list(&client.deployments, namespace, labels))
}

pub async fn create_deployment(client: &MockClusterClient, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
    client.record(MockOperation::CreateDeployment, deployment.metadata.name.as_deref().unwrap_or_default())?;
    create(client, &client.deployments, "Deployment", namespace, deployment)
}

pub async fn replace_deployment(client: &MockClusterClient, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
    client.record(MockOperation::ReplaceDeployment, deployment.metadata.name.as_deref().unwrap_or_default())?;
    // Status is a subresource; replacing the object never changes it
    replace(client, &client.deployments, "Deployment", namespace, deployment, |stored, replaced| {
        replaced.status = stored.status.clone();
    })
}

pub async fn delete_deployment(client: &MockClusterClient, key: &ObjectKey) -> Result<(), ClusterError> {
    client.record(MockOperation::DeleteDeployment, &key.name)?;
    delete(&client.deployments, "Deployment", key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn config_map(name: &str, owner: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                labels: Some(BTreeMap::from([("owner".to_string(), owner.to_string())])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_existing_conflicts() {
        let client = MockClusterClient::new();
        create_config_map(&client, "default", &config_map("a", "demo")).await.unwrap();
        let err = create_config_map(&client, "default", &config_map("a", "demo")).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_list_filters_by_label_and_namespace() {
        let client = MockClusterClient::new();
        client.insert_config_map(config_map("a", "demo"));
        client.insert_config_map(config_map("b", "other"));
        let mut elsewhere = config_map("c", "demo");
        elsewhere.metadata.namespace = Some("kube-system".to_string());
        client.insert_config_map(elsewhere);

        let found = list_config_maps(&client, "default", &[("owner", "demo")]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata.name.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_replace_checks_resource_version() {
        let client = MockClusterClient::new();
        let created = create_config_map(&client, "default", &config_map("a", "demo")).await.unwrap();

        let replaced = replace_config_map(&client, "default", &created).await.unwrap();
        assert_ne!(replaced.metadata.resource_version, created.metadata.resource_version);

        let err = replace_config_map(&client, "default", &created).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let client = MockClusterClient::new();
        let err = delete_config_map(&client, &ObjectKey::new("default", "missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let client = MockClusterClient::new();
        client.fail_on(MockOperation::CreateConfigMap, "a", crate::mock::FaultKind::Unavailable);

        let err = create_config_map(&client, "default", &config_map("a", "demo")).await.unwrap_err();
        assert!(err.is_retryable());
        create_config_map(&client, "default", &config_map("a", "demo")).await.unwrap();
        assert_eq!(client.operation_count(MockOperation::CreateConfigMap), 2);
    }
}
