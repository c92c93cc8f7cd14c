//! Kubernetes Object Store Client
//!
//! A narrow, mockable view of the Kubernetes API used by the Subprocess controller.
//! Covers the `Subprocess` custom resource (finalizers and status) and the
//! `ConfigMap` and `Deployment` objects generated from it.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, KubeClusterClient, ObjectKey};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::new(kube::Client::try_default().await?, Duration::from_secs(30));
//!
//! // Read a Subprocess
//! let key = ObjectKey::new("default", "demo");
//! let subprocess = client.get_subprocess(&key).await?;
//!
//! // Find everything it owns
//! let deployments = client.list_deployments("default", &[("owner", "demo")]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Typed errors**: API status codes are mapped to `ClusterError` variants
//! - **Request timeouts**: every call is bounded by a configurable timeout
//! - **Mock client**: in-memory store with fault injection behind `test-util`

pub mod client;
pub mod common;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeClusterClient;
pub use common::{label_selector, matches_labels, ObjectKey};
pub use error::ClusterError;
pub use cluster_trait::ClusterClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{FaultKind, MockClusterClient, MockOperation};
