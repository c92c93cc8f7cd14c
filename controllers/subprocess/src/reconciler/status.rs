//! Subprocess status computation.
//!
//! `lastTransitionTime` only moves when the phase changes, so two reconciles
//! of an unchanged resource compute identical statuses and the second one
//! skips the write.

use chrono::{DateTime, Utc};
use crds::{Subprocess, SubprocessPhase, SubprocessStatus};

fn transition_time(previous: Option<&SubprocessStatus>, phase: SubprocessPhase, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match previous {
        Some(prev) if prev.phase == phase => prev.last_transition_time.or(Some(now)),
        _ => Some(now),
    }
}

/// Status of a Subprocess whose dependents are applied
pub fn active_status(
    subprocess: &Subprocess,
    config_map_name: &str,
    deployment_name: &str,
    ready_replicas: i32,
    now: DateTime<Utc>,
) -> SubprocessStatus {
    let previous = subprocess.status.as_ref();
    SubprocessStatus {
        phase: SubprocessPhase::Active,
        observed_generation: subprocess.metadata.generation,
        config_map_name: Some(config_map_name.to_string()),
        deployment_name: Some(deployment_name.to_string()),
        replicas: subprocess.spec.replica_count,
        ready_replicas,
        error: None,
        last_transition_time: transition_time(previous, SubprocessPhase::Active, now),
    }
}

/// Status of a Subprocess whose spec cannot be materialized
///
/// Names and counts from the previous status are kept: dependents applied
/// from an earlier valid spec are left running.
pub fn failed_status(subprocess: &Subprocess, message: &str, now: DateTime<Utc>) -> SubprocessStatus {
    let previous = subprocess.status.clone().unwrap_or_default();
    SubprocessStatus {
        phase: SubprocessPhase::Failed,
        observed_generation: subprocess.metadata.generation,
        error: Some(message.to_string()),
        last_transition_time: transition_time(subprocess.status.as_ref(), SubprocessPhase::Failed, now),
        ..previous
    }
}

/// Status of a Subprocess being torn down
pub fn terminating_status(subprocess: &Subprocess, now: DateTime<Utc>) -> SubprocessStatus {
    let previous = subprocess.status.clone().unwrap_or_default();
    SubprocessStatus {
        phase: SubprocessPhase::Terminating,
        error: None,
        last_transition_time: transition_time(subprocess.status.as_ref(), SubprocessPhase::Terminating, now),
        ..previous
    }
}

/// Check if the stored status differs from the computed one
pub fn status_needs_update(current: Option<&SubprocessStatus>, desired: &SubprocessStatus) -> bool {
    current != Some(desired)
}
