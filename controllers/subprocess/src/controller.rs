//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Kubernetes
//! client, the reconciler and the Subprocess watcher together.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use cluster_client::{ClusterError, KubeClusterClient};
use kube::Client;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for Subprocess management.
pub struct Controller {
    subprocess_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its watcher.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Subprocess Controller");

        // Create Kubernetes client
        let kube_client = Client::try_default()
            .await
            .map_err(|e| ControllerError::Cluster(ClusterError::from(e)))?;

        let cluster_client = KubeClusterClient::new(kube_client.clone(), config.request_timeout);
        let reconciler = Reconciler::new(Box::new(cluster_client), config.clone());
        let watcher = Watcher::new(kube_client, reconciler, config);

        // Start watcher in a background task
        let subprocess_watcher = tokio::spawn(async move { watcher.watch_subprocesses().await });

        Ok(Self { subprocess_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Subprocess Controller running");

        self.subprocess_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("Subprocess watcher panicked: {}", e)))?
            .map_err(|e| ControllerError::Watch(format!("Subprocess watcher error: {}", e)))?;

        info!("Subprocess Controller stopped");
        Ok(())
    }
}
