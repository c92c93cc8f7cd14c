//! Resource generation for Subprocess dependents.
//!
//! Pure functions mapping a `SubprocessSpec` to the supervisord configuration
//! `ConfigMap` and the `Deployment` that mounts it. Nothing here talks to the
//! API server.

use crate::config::WorkloadTemplate;
use crate::error::ControllerError;
use crds::SubprocessSpec;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;
use thiserror::Error;

/// Label carrying the owning Subprocess name; the only discovery key for cleanup
pub const OWNER_LABEL: &str = "owner";
/// Label carrying the configured app name
pub const APP_LABEL: &str = "app";
/// ConfigMap data key holding the supervisor configuration
pub const CONFIG_KEY: &str = "supervisord.conf";

const CONTAINER_NAME: &str = "supervisor";
const CONFIG_VOLUME_NAME: &str = "supervisor-config";

const CONFIG_PREAMBLE: &str = "[supervisorctl]\n[supervisord]\nnodaemon=true\nlogfile=/var/log/supervisord.log\n";

/// Reasons a spec cannot be materialized
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("command {index} is empty")]
    EmptyCommand { index: usize },

    #[error("command {index} contains a line break")]
    MultilineCommand { index: usize },

    #[error("replicaCount must not be negative (got {0})")]
    NegativeReplicas(i32),
}

impl From<MaterializeError> for ControllerError {
    fn from(error: MaterializeError) -> Self {
        ControllerError::InvalidSpec(error.to_string())
    }
}

/// Desired dependents of one Subprocess
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredArtifacts {
    pub config_map: ConfigMap,
    pub deployment: Deployment,
}

pub fn config_map_name(owner: &str) -> String {
    format!("{}-supervisor-config", owner)
}

pub fn deployment_name(owner: &str) -> String {
    format!("{}-supervisor", owner)
}

/// Labels placed on every dependent of `owner`
pub fn owner_labels(owner: &str, app_label: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (OWNER_LABEL.to_string(), owner.to_string()),
        (APP_LABEL.to_string(), app_label.to_string()),
    ])
}

/// Render the supervisord configuration for an ordered list of commands
///
/// Each command becomes a `[program: command_<i>]` stanza, in input order.
pub fn render_supervisor_config(commands: &[String]) -> Result<String, MaterializeError> {
    let mut conf = String::from(CONFIG_PREAMBLE);
    for (index, command) in commands.iter().enumerate() {
        if command.trim().is_empty() {
            return Err(MaterializeError::EmptyCommand { index });
        }
        if command.contains(['\n', '\r']) {
            return Err(MaterializeError::MultilineCommand { index });
        }
        conf.push_str(&format!("[program: command_{}]\n{}\n", index, command));
    }
    Ok(conf)
}

/// Build the supervisor configuration ConfigMap
pub fn config_map(owner: &str, namespace: &str, config: String, template: &WorkloadTemplate) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map_name(owner)),
            namespace: Some(namespace.to_string()),
            labels: Some(owner_labels(owner, &template.app_label)),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(CONFIG_KEY.to_string(), config)])),
        ..Default::default()
    }
}

/// Build the supervisor Deployment mounting the configuration read-only
pub fn deployment(owner: &str, namespace: &str, replicas: i32, template: &WorkloadTemplate) -> Deployment {
    let labels = owner_labels(owner, &template.app_label);

    Deployment {
        metadata: ObjectMeta {
            name: Some(deployment_name(owner)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![supervisor_container(template)],
                    volumes: Some(vec![config_volume(owner)]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn supervisor_container(template: &WorkloadTemplate) -> Container {
    Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(template.image.clone()),
        image_pull_policy: Some(template.image_pull_policy.clone()),
        volume_mounts: Some(vec![VolumeMount {
            name: CONFIG_VOLUME_NAME.to_string(),
            mount_path: template.config_mount_path.clone(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn config_volume(owner: &str) -> Volume {
    Volume {
        name: CONFIG_VOLUME_NAME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name(owner),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Materialize both dependents of a Subprocess
pub fn materialize(
    owner: &str,
    spec: &SubprocessSpec,
    namespace: &str,
    template: &WorkloadTemplate,
) -> Result<DesiredArtifacts, MaterializeError> {
    if spec.replica_count < 0 {
        return Err(MaterializeError::NegativeReplicas(spec.replica_count));
    }
    let config = render_supervisor_config(&spec.commands)?;
    Ok(DesiredArtifacts {
        config_map: config_map(owner, namespace, config, template),
        deployment: deployment(owner, namespace, spec.replica_count, template),
    })
}

fn merge_labels(current: Option<&BTreeMap<String, String>>, desired: Option<&BTreeMap<String, String>>) -> Option<BTreeMap<String, String>> {
    let mut labels = current.cloned().unwrap_or_default();
    if let Some(desired) = desired {
        labels.extend(desired.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    Some(labels)
}

/// Re-assert the desired ConfigMap fields on a stored ConfigMap
///
/// Keeps server-owned metadata (resourceVersion, uid) and foreign labels.
pub fn overlay_config_map(current: &ConfigMap, desired: &ConfigMap) -> ConfigMap {
    let mut merged = current.clone();
    merged.metadata.labels = merge_labels(current.metadata.labels.as_ref(), desired.metadata.labels.as_ref());
    merged.data = desired.data.clone();
    merged.binary_data = None;
    merged
}

/// Re-assert the desired Deployment fields on a stored Deployment
///
/// Replicas, selector, pod labels, the supervisor container and the config
/// volume are taken from `desired`; server-defaulted fields of the stored
/// object are kept so an unchanged Deployment overlays to itself.
pub fn overlay_deployment(current: &Deployment, desired: &Deployment) -> Deployment {
    let mut merged = current.clone();
    merged.metadata.labels = merge_labels(current.metadata.labels.as_ref(), desired.metadata.labels.as_ref());

    let Some(desired_spec) = desired.spec.as_ref() else {
        return merged;
    };
    let spec = merged.spec.get_or_insert_with(Default::default);
    spec.replicas = desired_spec.replicas;
    spec.selector = desired_spec.selector.clone();

    let desired_template = &desired_spec.template;
    let pod_meta = spec.template.metadata.get_or_insert_with(Default::default);
    pod_meta.labels = merge_labels(
        pod_meta.labels.as_ref(),
        desired_template.metadata.as_ref().and_then(|meta| meta.labels.as_ref()),
    );

    if let Some(desired_pod) = desired_template.spec.as_ref() {
        let pod = spec.template.spec.get_or_insert_with(Default::default);
        pod.containers = desired_pod
            .containers
            .iter()
            .map(|wanted| {
                let existing = pod.containers.iter().find(|c| c.name == wanted.name);
                overlay_container(existing, wanted)
            })
            .collect();
        pod.volumes = desired_pod.volumes.as_ref().map(|volumes| {
            volumes
                .iter()
                .map(|wanted| {
                    let existing = pod
                        .volumes
                        .as_ref()
                        .and_then(|current| current.iter().find(|v| v.name == wanted.name));
                    overlay_volume(existing, wanted)
                })
                .collect()
        });
    }
    merged
}

fn overlay_container(current: Option<&Container>, desired: &Container) -> Container {
    let Some(current) = current else {
        return desired.clone();
    };
    let mut merged = current.clone();
    merged.image = desired.image.clone();
    merged.image_pull_policy = desired.image_pull_policy.clone();
    merged.volume_mounts = desired.volume_mounts.clone();
    merged
}

fn overlay_volume(current: Option<&Volume>, desired: &Volume) -> Volume {
    match (current.and_then(|v| v.config_map.as_ref()), desired.config_map.as_ref()) {
        (Some(current_source), Some(desired_source)) => {
            let mut source = current_source.clone();
            source.name = desired_source.name.clone();
            Volume {
                name: desired.name.clone(),
                config_map: Some(source),
                ..Default::default()
            }
        }
        _ => desired.clone(),
    }
}
