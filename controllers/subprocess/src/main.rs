//! Subprocess Controller
//!
//! Runs a list of shell commands under supervisord inside the cluster.
//!
//! This controller reconciles `Subprocess` CRDs into a supervisor configuration
//! `ConfigMap` and a `Deployment` mounting it, and holds a finalizer on each
//! `Subprocess` until everything it generated has been deleted.

mod backoff;
mod config;
mod controller;
mod error;
mod finalizer;
mod materializer;
mod reconciler;
mod watcher;
#[cfg(test)]
mod test_utils;

use anyhow::{anyhow, Context, Result};
use config::ControllerConfig;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("Starting Subprocess Controller");

    // Load configuration from environment variables
    let config = ControllerConfig::from_env().context("failed to load controller configuration")?;

    info!("Configuration:");
    info!("  Watch namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Target namespace: {}", config.target_namespace);
    info!("  Supervisor image: {} ({})", config.workload.image, config.workload.image_pull_policy);
    info!("  Finalizer: {}", config.finalizer);
    info!("  Concurrency: {}, debounce: {:?}, resync: {:?}", config.concurrency, config.debounce, config.resync_interval);

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` selects the filter (default `info`); `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}
