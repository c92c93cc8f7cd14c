//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::config::ControllerConfig;
use crate::materializer::{config_map_name, deployment_name, owner_labels};
use crate::reconciler::Reconciler;
use cluster_client::{MockClusterClient, ObjectKey};
use crds::{Subprocess, SubprocessSpec};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Helper to create test Subprocess CRD
pub fn create_test_subprocess(name: &str, namespace: &str, commands: &[&str], replicas: i32) -> Subprocess {
    Subprocess {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: SubprocessSpec {
            commands: commands.iter().map(|c| c.to_string()).collect(),
            replica_count: replicas,
        },
        status: None,
    }
}

/// Helper to create a ConfigMap labeled as owned by `owner`
pub fn create_test_owned_config_map(name: &str, namespace: &str, owner: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(owner_labels(owner, "supervisor")),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Helper to create a Deployment labeled as owned by `owner`
pub fn create_test_owned_deployment(name: &str, namespace: &str, owner: &str) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(owner_labels(owner, "supervisor")),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Helper to create a reconciler over a shared mock store
pub fn create_test_reconciler(mock: &MockClusterClient) -> Reconciler {
    create_test_reconciler_with_config(mock, ControllerConfig::default())
}

pub fn create_test_reconciler_with_config(mock: &MockClusterClient, config: ControllerConfig) -> Reconciler {
    Reconciler::new(Box::new(mock.clone()), config)
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new("default", name)
}

pub fn config_map_key(owner: &str) -> ObjectKey {
    ObjectKey::new("default", config_map_name(owner))
}

pub fn deployment_key(owner: &str) -> ObjectKey {
    ObjectKey::new("default", deployment_name(owner))
}

/// Names of the ConfigMaps and Deployments labeled as owned by `owner`
pub fn owned_dependents(mock: &MockClusterClient, owner: &str) -> (Vec<String>, Vec<String>) {
    let owned = |labels: Option<&std::collections::BTreeMap<String, String>>| {
        labels
            .and_then(|labels| labels.get("owner"))
            .is_some_and(|value| value == owner)
    };
    let config_maps = mock
        .config_maps()
        .into_iter()
        .filter(|cm| owned(cm.metadata.labels.as_ref()))
        .filter_map(|cm| cm.metadata.name)
        .collect();
    let deployments = mock
        .deployments()
        .into_iter()
        .filter(|d| owned(d.metadata.labels.as_ref()))
        .filter_map(|d| d.metadata.name)
        .collect();
    (config_maps, deployments)
}
