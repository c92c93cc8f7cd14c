//! Active path: finalizer first, then the supervisor ConfigMap and Deployment.

use super::terminating::Retained;
use super::{status, ReconcileOutcome, Reconciler};
use crate::error::ControllerError;
use crate::finalizer::with_finalizer;
use crate::materializer::{materialize, overlay_config_map, overlay_deployment};
use cluster_client::ObjectKey;
use crds::Subprocess;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use tracing::{debug, info, warn};

/// Result of ensuring the finalizer on an Active Subprocess
pub(crate) enum FinalizerState {
    /// Finalizer is present on this (fresh) copy
    Held(Subprocess),
    /// The resource was deleted or began terminating in the meantime
    Lost(Option<Subprocess>),
}

impl Reconciler {
    pub(crate) async fn reconcile_active(
        &self,
        key: &ObjectKey,
        subprocess: Subprocess,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let subprocess = match self.ensure_finalizer(key, subprocess).await? {
            FinalizerState::Held(subprocess) => subprocess,
            FinalizerState::Lost(observed) => {
                info!("Subprocess {} started terminating during reconcile", key);
                return self.reconcile_terminating(key, observed).await;
            }
        };

        let namespace = &self.config.target_namespace;
        let artifacts = match materialize(&key.name, &subprocess.spec, namespace, &self.config.workload) {
            Ok(artifacts) => artifacts,
            Err(e) => {
                warn!("Subprocess {} has an invalid spec: {}", key, e);
                let failed = status::failed_status(&subprocess, &e.to_string(), chrono::Utc::now());
                self.write_status(key, &subprocess, failed).await;
                return Err(e.into());
            }
        };

        let config_map = self.apply_config_map(&artifacts.config_map).await?;
        let deployment = self.apply_deployment(&artifacts.deployment).await?;

        let config_map_name = config_map.name_any();
        let deployment_name = deployment.name_any();

        // Only the two named dependents may carry this owner label
        let retained = Retained {
            deployment: Some(&deployment_name),
            config_map: Some(&config_map_name),
        };
        let pruned = self.delete_dependents(&key.name, &retained).await?;
        if pruned > 0 {
            info!("Pruned {} stray dependents of Subprocess {}", pruned, key);
        }
        let ready_replicas = deployment
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0);

        let active = status::active_status(
            &subprocess,
            &config_map_name,
            &deployment_name,
            ready_replicas,
            chrono::Utc::now(),
        );
        self.write_status(key, &subprocess, active).await;

        Ok(ReconcileOutcome::Applied {
            config_map: config_map_name,
            deployment: deployment_name,
            ready_replicas,
        })
    }

    /// Add the finalizer unless present, re-fetching on conflict
    pub(crate) async fn ensure_finalizer(
        &self,
        key: &ObjectKey,
        mut subprocess: Subprocess,
    ) -> Result<FinalizerState, ControllerError> {
        for attempt in 1..=self.config.conflict_retries {
            let Some(finalizers) = with_finalizer(&subprocess, &self.config.finalizer) else {
                return Ok(FinalizerState::Held(subprocess));
            };

            let resource_version = subprocess.resource_version();
            match self
                .client
                .replace_subprocess_finalizers(key, &finalizers, resource_version.as_deref())
                .await
            {
                Ok(updated) => {
                    info!("Added finalizer {} to Subprocess {}", self.config.finalizer, key);
                    return Ok(FinalizerState::Held(updated));
                }
                Err(e) if e.is_conflict() => {
                    debug!("Finalizer write for Subprocess {} conflicted (attempt {}), re-fetching", key, attempt);
                    match self.client.get_subprocess(key).await? {
                        Some(fresh) if fresh.metadata.deletion_timestamp.is_none() => subprocess = fresh,
                        observed => return Ok(FinalizerState::Lost(observed)),
                    }
                }
                Err(e) if e.is_not_found() => return Ok(FinalizerState::Lost(None)),
                Err(e) => return Err(e.into()),
            }
        }
        Err(ControllerError::ConflictRetriesExhausted(format!("finalizer on Subprocess {}", key)))
    }

    /// Create the ConfigMap, or re-assert desired fields on the stored one
    async fn apply_config_map(&self, desired: &ConfigMap) -> Result<ConfigMap, ControllerError> {
        let namespace = &self.config.target_namespace;
        let key = ObjectKey::new(namespace.as_str(), desired.name_any());

        for attempt in 1..=self.config.conflict_retries {
            let result = match self.client.get_config_map(&key).await? {
                None => {
                    let created = self.client.create_config_map(namespace, desired).await;
                    if created.is_ok() {
                        info!("Created ConfigMap {}", key);
                    }
                    created
                }
                Some(current) => {
                    let merged = overlay_config_map(&current, desired);
                    if merged == current {
                        debug!("ConfigMap {} is up to date", key);
                        return Ok(current);
                    }
                    let replaced = self.client.replace_config_map(namespace, &merged).await;
                    if replaced.is_ok() {
                        info!("Updated ConfigMap {}", key);
                    }
                    replaced
                }
            };

            match result {
                Ok(config_map) => return Ok(config_map),
                Err(e) if e.is_conflict() => {
                    debug!("Write to ConfigMap {} conflicted (attempt {})", key, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ControllerError::ConflictRetriesExhausted(format!("ConfigMap {}", key)))
    }

    /// Create the Deployment, or re-assert desired fields on the stored one
    async fn apply_deployment(&self, desired: &Deployment) -> Result<Deployment, ControllerError> {
        let namespace = &self.config.target_namespace;
        let key = ObjectKey::new(namespace.as_str(), desired.name_any());

        for attempt in 1..=self.config.conflict_retries {
            let result = match self.client.get_deployment(&key).await? {
                None => {
                    let created = self.client.create_deployment(namespace, desired).await;
                    if created.is_ok() {
                        info!("Created Deployment {}", key);
                    }
                    created
                }
                Some(current) => {
                    let merged = overlay_deployment(&current, desired);
                    if merged == current {
                        debug!("Deployment {} is up to date", key);
                        return Ok(current);
                    }
                    let replaced = self.client.replace_deployment(namespace, &merged).await;
                    if replaced.is_ok() {
                        info!("Updated Deployment {}", key);
                    }
                    replaced
                }
            };

            match result {
                Ok(deployment) => return Ok(deployment),
                Err(e) if e.is_conflict() => {
                    debug!("Write to Deployment {} conflicted (attempt {})", key, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ControllerError::ConflictRetriesExhausted(format!("Deployment {}", key)))
    }
}
