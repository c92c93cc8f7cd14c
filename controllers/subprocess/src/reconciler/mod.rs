//! Reconciliation logic for Subprocess resources.
//!
//! Every invocation re-derives the lifecycle state from the store:
//! - `active`: finalizer, supervisor ConfigMap and Deployment are applied
//! - `terminating`: labeled dependents are deleted, then the finalizer is released
//! - `status`: status computation and change detection

pub mod active;
pub mod status;
pub mod terminating;


use crate::config::ControllerConfig;
use crate::error::ControllerError;
use cluster_client::{ClusterClientTrait, ObjectKey};
use crds::{Subprocess, SubprocessStatus};
use tracing::{debug, warn};

/// Lifecycle state of a Subprocess as observed at the start of a reconcile
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleState {
    /// Exists without a deletion timestamp
    Active(Subprocess),
    /// Deletion requested (`Some`) or already gone from the store (`None`)
    Terminating(Option<Subprocess>),
}

impl LifecycleState {
    /// Classify the result of fetching a Subprocess
    pub fn observe(found: Option<Subprocess>) -> Self {
        match found {
            Some(subprocess) if subprocess.metadata.deletion_timestamp.is_none() => {
                LifecycleState::Active(subprocess)
            }
            other => LifecycleState::Terminating(other),
        }
    }
}

/// Result of a successful reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Dependents match the spec
    Applied {
        config_map: String,
        deployment: String,
        ready_replicas: i32,
    },
    /// Dependents are gone
    Cleaned {
        deleted: usize,
        finalizer_released: bool,
    },
}

/// Reconciles Subprocess resources.
pub struct Reconciler {
    pub(crate) client: Box<dyn ClusterClientTrait + Send + Sync>,
    pub(crate) config: ControllerConfig,
}

impl Reconciler {
    /// Create a reconciler over `client`, writing dependents per `config`
    pub fn new(client: Box<dyn ClusterClientTrait + Send + Sync>, config: ControllerConfig) -> Self {
        Self { client, config }
    }

    /// Drive the cluster toward the declared state of the Subprocess at `key`
    ///
    /// Safe to re-run for the same key and to run concurrently for distinct keys.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ControllerError> {
        let found = self.client.get_subprocess(key).await?;
        match LifecycleState::observe(found) {
            LifecycleState::Active(subprocess) => self.reconcile_active(key, subprocess).await,
            LifecycleState::Terminating(subprocess) => self.reconcile_terminating(key, subprocess).await,
        }
    }

    /// Patch status if it differs from what is stored; failures only log
    pub(crate) async fn write_status(&self, key: &ObjectKey, subprocess: &Subprocess, desired: SubprocessStatus) {
        if !status::status_needs_update(subprocess.status.as_ref(), &desired) {
            debug!("Subprocess {} status unchanged, skipping update", key);
            return;
        }
        if let Err(e) = self.client.patch_subprocess_status(key, &desired).await {
            warn!("Failed to update status for Subprocess {}: {}", key, e);
        }
    }
}
