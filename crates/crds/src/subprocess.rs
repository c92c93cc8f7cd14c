//! Subprocess CRD
//!
//! Declares a list of shell commands to be run under a process supervisor.
//! The controller turns each `Subprocess` into a supervisor configuration
//! `ConfigMap` and a `Deployment` that mounts it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "webapp.my.domain",
    version = "v1",
    kind = "Subprocess",
    plural = "subprocesses",
    namespaced,
    status = "SubprocessStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicaCount"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyReplicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SubprocessSpec {
    /// Commands to supervise, one supervisor program per entry, in order
    #[serde(default)]
    pub commands: Vec<String>,

    /// Number of supervisor replicas to run
    ///
    /// Manifests written against the original schema use `replica`; both are accepted.
    #[serde(default = "default_replica_count", alias = "replica")]
    pub replica_count: i32,
}

fn default_replica_count() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubprocessStatus {
    /// Lifecycle phase as last observed by the controller
    #[serde(default)]
    pub phase: SubprocessPhase,

    /// Generation of the spec this status describes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Name of the generated supervisor configuration ConfigMap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_name: Option<String>,

    /// Name of the generated supervisor Deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,

    /// Replica count applied to the Deployment
    #[serde(default)]
    pub replicas: i32,

    /// Ready replicas reported by the Deployment
    #[serde(default)]
    pub ready_replicas: i32,

    /// Error message if the spec could not be materialized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Time the phase last changed
    ///
    /// Only written on a phase change so that steady-state reconciles do not
    /// produce status writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
/// Subprocess lifecycle phase
///
/// Serializes as PascalCase ("Active", "Failed", etc.).
#[serde(rename_all = "PascalCase")]
pub enum SubprocessPhase {
    /// Not reconciled yet
    #[default]
    Pending,

    /// Supervisor configuration and Deployment are applied
    Active,

    /// Spec cannot be materialized; will not be retried until it changes
    Failed,

    /// Deletion requested, dependents being removed
    Terminating,
}

impl std::fmt::Display for SubprocessPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubprocessPhase::Pending => "Pending",
            SubprocessPhase::Active => "Active",
            SubprocessPhase::Failed => "Failed",
            SubprocessPhase::Terminating => "Terminating",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_spec_accepts_original_replica_field() {
        let spec: SubprocessSpec = serde_json::from_value(serde_json::json!({
            "commands": ["echo hi"],
            "replica": 4
        }))
        .unwrap();
        assert_eq!(spec.replica_count, 4);
        assert_eq!(spec.commands, vec!["echo hi".to_string()]);
    }

    #[test]
    fn test_spec_defaults() {
        let spec: SubprocessSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(spec.commands.is_empty());
        assert_eq!(spec.replica_count, 1);
    }

    #[test]
    fn test_spec_serializes_camel_case() {
        let spec = SubprocessSpec {
            commands: vec!["sleep 1".to_string()],
            replica_count: 2,
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["replicaCount"], 2);
        assert!(value.get("replica").is_none());
    }

    #[test]
    fn test_status_phase_is_pascal_case() {
        let status = SubprocessStatus {
            phase: SubprocessPhase::Active,
            ..Default::default()
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["phase"], "Active");
        assert!(value.get("error").is_none());
        assert!(value.get("lastTransitionTime").is_none());
    }

    #[test]
    fn test_crd_identity() {
        let crd = Subprocess::crd();
        assert_eq!(crd.spec.group, "webapp.my.domain");
        assert_eq!(crd.spec.names.kind, "Subprocess");
        assert_eq!(crd.spec.names.plural, "subprocesses");
        assert_eq!(crd.spec.versions[0].name, "v1");
    }
}
