//! Kubernetes resource watchers.
//!
//! This module handles watching Subprocess resources for changes and
//! triggering reconciliation using kube_runtime::Controller, which provides
//! the keyed work queue: same-key reconciles never overlap, distinct keys run
//! concurrently up to the configured limit.

use crate::backoff::BackoffState;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::materializer::OWNER_LABEL;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use cluster_client::ObjectKey;
use crds::Subprocess;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Shared state handed to every reconcile
pub struct Context {
    reconciler: Reconciler,
    resync_interval: Duration,
    backoff_min_secs: u64,
    backoff_max_secs: u64,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Mutex<HashMap<ObjectKey, BackoffState>>,
}

impl Context {
    pub fn new(reconciler: Reconciler, config: &ControllerConfig) -> Self {
        Self {
            reconciler,
            resync_interval: config.resync_interval,
            backoff_min_secs: config.backoff_min_secs,
            backoff_max_secs: config.backoff_max_secs,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure for `key` and return how long to wait before retrying
    fn next_backoff(&self, key: &ObjectKey) -> (Duration, u32) {
        let mut states = match self.backoff_states.lock() {
            Ok(states) => states,
            Err(poisoned) => poisoned.into_inner(),
        };
        let state = states
            .entry(key.clone())
            .or_insert_with(|| BackoffState::new(self.backoff_min_secs, self.backoff_max_secs));
        let delay = state.record_error();
        (delay, state.error_count())
    }

    fn reset_backoff(&self, key: &ObjectKey) {
        let mut states = match self.backoff_states.lock() {
            Ok(states) => states,
            Err(poisoned) => poisoned.into_inner(),
        };
        states.remove(key);
    }

    /// Requeue decision for a successful reconcile
    fn action_for(&self, outcome: &ReconcileOutcome) -> Action {
        match outcome {
            ReconcileOutcome::Applied { .. } => Action::requeue(self.resync_interval),
            ReconcileOutcome::Cleaned { .. } => Action::await_change(),
        }
    }

    /// Requeue decision for a failed reconcile
    fn action_for_error(&self, key: &ObjectKey, error: &ControllerError) -> Action {
        if !error.is_retryable() {
            error!("Reconciliation of Subprocess {} failed permanently: {}", key, error);
            self.reset_backoff(key);
            return Action::await_change();
        }
        let (delay, attempts) = self.next_backoff(key);
        warn!(
            "Reconciliation of Subprocess {} failed (attempt {}), retrying in {:?}: {}",
            key, attempts, delay, error
        );
        Action::requeue(delay)
    }
}

fn object_key(subprocess: &Subprocess) -> ObjectKey {
    ObjectKey::new(
        subprocess.namespace().unwrap_or_default(),
        subprocess.name_any(),
    )
}

async fn reconcile(subprocess: Arc<Subprocess>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let key = object_key(&subprocess);
    debug!("Reconciling Subprocess {}", key);

    let outcome = ctx.reconciler.reconcile(&key).await?;
    ctx.reset_backoff(&key);
    debug!("Subprocess {} reconciled: {:?}", key, outcome);
    Ok(ctx.action_for(&outcome))
}

fn error_policy(subprocess: Arc<Subprocess>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    ctx.action_for_error(&object_key(&subprocess), error)
}

/// Map a labeled dependent back to the Subprocess that owns it
fn owner_ref<K: ResourceExt>(dependent: &K, namespace: &str) -> Option<ObjectRef<Subprocess>> {
    dependent
        .labels()
        .get(OWNER_LABEL)
        .map(|owner| ObjectRef::new(owner).within(namespace))
}

/// Watches Subprocess resources and their dependents.
pub struct Watcher {
    client: Client,
    context: Arc<Context>,
    config: ControllerConfig,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(client: Client, reconciler: Reconciler, config: ControllerConfig) -> Self {
        let context = Arc::new(Context::new(reconciler, &config));
        Self {
            client,
            context,
            config,
        }
    }

    /// Starts watching Subprocess resources until a shutdown signal arrives.
    pub async fn watch_subprocesses(self) -> Result<(), ControllerError> {
        info!("Starting Subprocess watcher");

        let subprocesses: Api<Subprocess> = match &self.config.watch_namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        };

        let runtime_config = RuntimeConfig::default()
            .debounce(self.config.debounce)
            .concurrency(self.config.concurrency);

        let mut controller = Controller::new(subprocesses, watcher::Config::default())
            .with_config(runtime_config)
            .shutdown_on_signal();

        // Owner labels carry no namespace, so dependents can only be mapped
        // back when a single namespace is watched
        if let Some(namespace) = self.config.watch_namespace.clone() {
            let dependents_config = watcher::Config::default().labels(OWNER_LABEL);
            let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.config.target_namespace);
            let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), &self.config.target_namespace);

            let owner_namespace = namespace.clone();
            controller = controller.watches(config_maps, dependents_config.clone(), move |cm: ConfigMap| {
                owner_ref(&cm, &owner_namespace)
            });
            controller = controller.watches(deployments, dependents_config, move |deploy: Deployment| {
                owner_ref(&deploy, &namespace)
            });
            info!("Watching labeled ConfigMaps and Deployments in {}", self.config.target_namespace);
        }

        controller
            .run(reconcile, error_policy, self.context)
            .for_each(|res| async move {
                match res {
                    Ok((object, _)) => debug!("Reconciled {}", object),
                    Err(kube_runtime::controller::Error::ObjectNotFound(object)) => {
                        debug!("Skipping {}: no longer in cache", object)
                    }
                    Err(e) => error!("Controller error for Subprocess: {}", e),
                }
            })
            .await;

        info!("Subprocess watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_owned_config_map, create_test_reconciler};
    use cluster_client::MockClusterClient;

    fn context() -> Context {
        let config = ControllerConfig {
            backoff_min_secs: 5,
            backoff_max_secs: 20,
            ..Default::default()
        };
        Context::new(create_test_reconciler(&MockClusterClient::new()), &config)
    }

    #[test]
    fn test_retryable_errors_back_off() {
        let ctx = context();
        let key = ObjectKey::new("default", "demo");
        let error = ControllerError::PartialCleanup {
            deleted: 0,
            failed: vec!["ConfigMap default/demo-supervisor-config".to_string()],
        };

        assert_eq!(ctx.action_for_error(&key, &error), Action::requeue(Duration::from_secs(5)));
        assert_eq!(ctx.action_for_error(&key, &error), Action::requeue(Duration::from_secs(5)));
        assert_eq!(ctx.action_for_error(&key, &error), Action::requeue(Duration::from_secs(10)));

        ctx.reset_backoff(&key);
        assert_eq!(ctx.action_for_error(&key, &error), Action::requeue(Duration::from_secs(5)));
    }

    #[test]
    fn test_terminal_errors_wait_for_change() {
        let ctx = context();
        let key = ObjectKey::new("default", "demo");
        let error = ControllerError::InvalidSpec("command 0 is empty".to_string());
        assert_eq!(ctx.action_for_error(&key, &error), Action::await_change());
    }

    #[test]
    fn test_outcome_actions() {
        let ctx = context();
        let applied = ReconcileOutcome::Applied {
            config_map: "demo-supervisor-config".to_string(),
            deployment: "demo-supervisor".to_string(),
            ready_replicas: 1,
        };
        let cleaned = ReconcileOutcome::Cleaned {
            deleted: 2,
            finalizer_released: true,
        };
        assert_eq!(ctx.action_for(&applied), Action::requeue(Duration::from_secs(300)));
        assert_eq!(ctx.action_for(&cleaned), Action::await_change());
    }

    #[test]
    fn test_owner_ref_from_label() {
        let cm = create_test_owned_config_map("demo-supervisor-config", "default", "demo");
        let owner = owner_ref(&cm, "apps").unwrap();
        assert_eq!(owner.name, "demo");
        assert_eq!(owner.namespace.as_deref(), Some("apps"));

        let unlabeled = ConfigMap::default();
        assert!(owner_ref(&unlabeled, "apps").is_none());
    }
}
