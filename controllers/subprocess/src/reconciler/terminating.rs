//! Terminating path: delete every labeled dependent, then release the finalizer.

use super::{status, ReconcileOutcome, Reconciler};
use crate::error::ControllerError;
use crate::finalizer::{has_finalizer, without_finalizer};
use crate::materializer::OWNER_LABEL;
use cluster_client::ObjectKey;
use crds::Subprocess;
use kube::ResourceExt;
use tracing::{debug, info, warn};

/// Dependent names exempt from deletion
#[derive(Debug, Default)]
pub(crate) struct Retained<'a> {
    pub(crate) deployment: Option<&'a str>,
    pub(crate) config_map: Option<&'a str>,
}

impl Reconciler {
    pub(crate) async fn reconcile_terminating(
        &self,
        key: &ObjectKey,
        subprocess: Option<Subprocess>,
    ) -> Result<ReconcileOutcome, ControllerError> {
        if let Some(subprocess) = subprocess.as_ref() {
            if has_finalizer(subprocess, &self.config.finalizer) {
                let terminating = status::terminating_status(subprocess, chrono::Utc::now());
                self.write_status(key, subprocess, terminating).await;
            }
        }

        let deleted = self.delete_dependents(&key.name, &Retained::default()).await?;

        let finalizer_released = match subprocess {
            Some(_) => self.release_finalizer(key).await?,
            None => false,
        };

        if deleted > 0 || finalizer_released {
            info!(
                "Cleaned up Subprocess {}: deleted {} dependents, finalizer released: {}",
                key, deleted, finalizer_released
            );
        } else {
            debug!("Nothing to clean up for Subprocess {}", key);
        }
        Ok(ReconcileOutcome::Cleaned {
            deleted,
            finalizer_released,
        })
    }

    /// Delete every Deployment and ConfigMap labeled as owned by `owner`,
    /// except the names in `retained`
    ///
    /// Returns the number deleted by this call. Objects already gone count as
    /// done; any other failure is collected into `PartialCleanup`.
    pub(crate) async fn delete_dependents(
        &self,
        owner: &str,
        retained: &Retained<'_>,
    ) -> Result<usize, ControllerError> {
        let namespace = &self.config.target_namespace;
        let selector = [(OWNER_LABEL, owner)];

        let deployments = self.client.list_deployments(namespace, &selector).await?;
        let config_maps = self.client.list_config_maps(namespace, &selector).await?;

        let mut deleted = 0;
        let mut failed = Vec::new();

        let deployments = deployments
            .iter()
            .filter(|d| retained.deployment != Some(d.name_any().as_str()));
        for deployment in deployments {
            let key = ObjectKey::new(namespace.as_str(), deployment.name_any());
            match self.client.delete_deployment(&key).await {
                Ok(()) => {
                    info!("Deleted Deployment {} owned by {}", key, owner);
                    deleted += 1;
                }
                Err(e) if e.is_not_found() => debug!("Deployment {} already deleted", key),
                Err(e) => {
                    warn!("Failed to delete Deployment {}: {}", key, e);
                    failed.push(format!("Deployment {}", key));
                }
            }
        }

        let config_maps = config_maps
            .iter()
            .filter(|cm| retained.config_map != Some(cm.name_any().as_str()));
        for config_map in config_maps {
            let key = ObjectKey::new(namespace.as_str(), config_map.name_any());
            match self.client.delete_config_map(&key).await {
                Ok(()) => {
                    info!("Deleted ConfigMap {} owned by {}", key, owner);
                    deleted += 1;
                }
                Err(e) if e.is_not_found() => debug!("ConfigMap {} already deleted", key),
                Err(e) => {
                    warn!("Failed to delete ConfigMap {}: {}", key, e);
                    failed.push(format!("ConfigMap {}", key));
                }
            }
        }

        if failed.is_empty() {
            Ok(deleted)
        } else {
            Err(ControllerError::PartialCleanup { deleted, failed })
        }
    }

    /// Remove the finalizer from a terminating Subprocess, re-fetching on conflict
    ///
    /// Returns `false` when there was nothing to release: the resource is gone,
    /// no longer carries the finalizer, or has been recreated and is not terminating.
    async fn release_finalizer(&self, key: &ObjectKey) -> Result<bool, ControllerError> {
        for attempt in 1..=self.config.conflict_retries {
            let Some(current) = self.client.get_subprocess(key).await? else {
                return Ok(false);
            };
            if current.metadata.deletion_timestamp.is_none() {
                debug!("Subprocess {} is no longer terminating, keeping finalizer", key);
                return Ok(false);
            }
            let Some(finalizers) = without_finalizer(&current, &self.config.finalizer) else {
                return Ok(false);
            };

            let resource_version = current.resource_version();
            match self
                .client
                .replace_subprocess_finalizers(key, &finalizers, resource_version.as_deref())
                .await
            {
                Ok(_) => {
                    info!("Removed finalizer {} from Subprocess {}", self.config.finalizer, key);
                    return Ok(true);
                }
                Err(e) if e.is_conflict() => {
                    debug!("Finalizer release for Subprocess {} conflicted (attempt {})", key, attempt);
                }
                Err(e) if e.is_not_found() => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
        Err(ControllerError::ConflictRetriesExhausted(format!("finalizer release on Subprocess {}", key)))
    }
}
