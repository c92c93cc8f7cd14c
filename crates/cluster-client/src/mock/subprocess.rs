//! Subprocess operations for MockClusterClient
//!
//! Handles reads, finalizer writes, and status writes

use super::{MockClusterClient, MockOperation};
use crate::common::ObjectKey;
use crate::error::ClusterError;
use crds::{Subprocess, SubprocessStatus};

pub async fn get_subprocess(client: &MockClusterClient, key: &ObjectKey) -> Result<Option<Subprocess>, ClusterError> {
    client.record(MockOperation::GetSubprocess, &key.name)?;
    Ok(client.subprocesses.lock().unwrap().get(key).cloned())
}

pub async fn replace_subprocess_finalizers(
    client: &MockClusterClient,
    key: &ObjectKey,
    finalizers: &[String],
    resource_version: Option<&str>,
) -> Result<Subprocess, ClusterError> {
    client.record(MockOperation::ReplaceFinalizers, &key.name)?;
    let next_version = client.next_resource_version();

    let mut subprocesses = client.subprocesses.lock().unwrap();
    let subprocess = subprocesses
        .get_mut(key)
        .ok_or_else(|| ClusterError::NotFound(format!("Subprocess {} not found", key)))?;

    if let Some(expected) = resource_version {
        if subprocess.metadata.resource_version.as_deref() != Some(expected) {
            return Err(ClusterError::Conflict(format!(
                "Subprocess {} has been modified (expected resourceVersion {})",
                key, expected
            )));
        }
    }

    subprocess.metadata.finalizers = if finalizers.is_empty() {
        None
    } else {
        Some(finalizers.to_vec())
    };
    subprocess.metadata.resource_version = Some(next_version);
    let updated = subprocess.clone();

    // Last finalizer gone on a deleting object: the API server removes it
    if updated.metadata.deletion_timestamp.is_some() && finalizers.is_empty() {
        subprocesses.remove(key);
    }
    Ok(updated)
}

pub async fn patch_subprocess_status(client: &MockClusterClient, key: &ObjectKey, status: &SubprocessStatus) -> Result<(), ClusterError> {
    client.record(MockOperation::PatchStatus, &key.name)?;
    let next_version = client.next_resource_version();

    let mut subprocesses = client.subprocesses.lock().unwrap();
    let subprocess = subprocesses
        .get_mut(key)
        .ok_or_else(|| ClusterError::NotFound(format!("Subprocess {} not found", key)))?;
    subprocess.status = Some(status.clone());
    subprocess.metadata.resource_version = Some(next_version);
    Ok(())
}
