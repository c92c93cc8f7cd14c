//! Controller configuration.
//!
//! Loaded once at startup from environment variables. Every value has a
//! default except `WATCH_NAMESPACE`, whose absence means "all namespaces".

use crate::error::ControllerError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default finalizer marker placed on Subprocess resources
pub const DEFAULT_FINALIZER: &str = "webapp.my.domain/finalizer";

/// Shape of the generated supervisor Deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadTemplate {
    /// Container image running supervisord
    pub image: String,
    /// Image pull policy of the supervisor container
    pub image_pull_policy: String,
    /// Value of the `app` label on every generated object
    pub app_label: String,
    /// Directory the supervisor configuration is mounted at
    pub config_mount_path: String,
}

impl Default for WorkloadTemplate {
    fn default() -> Self {
        Self {
            image: "supervisord:latest".to_string(),
            image_pull_policy: "IfNotPresent".to_string(),
            app_label: "supervisor".to_string(),
            config_mount_path: "/etc/supervisor/conf.d".to_string(),
        }
    }
}

/// Runtime configuration of the Subprocess controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch for Subprocess resources, `None` for all namespaces
    pub watch_namespace: Option<String>,
    /// Namespace the ConfigMaps and Deployments are written to
    pub target_namespace: String,
    /// Finalizer marker that blocks removal until dependents are gone
    pub finalizer: String,
    pub workload: WorkloadTemplate,
    /// Maximum concurrent reconciles across distinct keys
    pub concurrency: u16,
    /// Quiet period after the last event before a reconcile starts
    pub debounce: Duration,
    /// Requeue interval for healthy resources
    pub resync_interval: Duration,
    /// Upper bound for a single API request
    pub request_timeout: Duration,
    /// Attempts for a create-or-update or finalizer write that keeps conflicting
    pub conflict_retries: u32,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            target_namespace: "default".to_string(),
            finalizer: DEFAULT_FINALIZER.to_string(),
            workload: WorkloadTemplate::default(),
            concurrency: 3,
            debounce: Duration::from_secs(5),
            resync_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            conflict_retries: 3,
            backoff_min_secs: 5,
            backoff_max_secs: 300,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            watch_namespace: get("WATCH_NAMESPACE"),
            target_namespace: get("TARGET_NAMESPACE").unwrap_or(defaults.target_namespace),
            finalizer: get("SUBPROCESS_FINALIZER").unwrap_or(defaults.finalizer),
            workload: WorkloadTemplate {
                image: get("SUPERVISOR_IMAGE").unwrap_or(defaults.workload.image),
                image_pull_policy: get("SUPERVISOR_IMAGE_PULL_POLICY")
                    .unwrap_or(defaults.workload.image_pull_policy),
                app_label: get("SUPERVISOR_APP_LABEL").unwrap_or(defaults.workload.app_label),
                config_mount_path: get("SUPERVISOR_CONFIG_MOUNT_PATH")
                    .unwrap_or(defaults.workload.config_mount_path),
            },
            concurrency: parse_var(&get, "RECONCILE_CONCURRENCY", defaults.concurrency)?,
            debounce: Duration::from_secs(parse_var(&get, "RECONCILE_DEBOUNCE_SECS", defaults.debounce.as_secs())?),
            resync_interval: Duration::from_secs(parse_var(&get, "RESYNC_INTERVAL_SECS", defaults.resync_interval.as_secs())?),
            request_timeout: Duration::from_secs(parse_var(&get, "REQUEST_TIMEOUT_SECS", defaults.request_timeout.as_secs())?),
            conflict_retries: parse_var(&get, "CONFLICT_RETRIES", defaults.conflict_retries)?,
            backoff_min_secs: parse_var(&get, "BACKOFF_MIN_SECS", defaults.backoff_min_secs)?,
            backoff_max_secs: parse_var(&get, "BACKOFF_MAX_SECS", defaults.backoff_max_secs)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "REQUEST_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        if self.resync_interval.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "RESYNC_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }
        if self.conflict_retries == 0 {
            return Err(ControllerError::InvalidConfig(
                "CONFLICT_RETRIES must be at least 1".to_string(),
            ));
        }
        if self.backoff_min_secs == 0 || self.backoff_min_secs > self.backoff_max_secs {
            return Err(ControllerError::InvalidConfig(format!(
                "backoff bounds must satisfy 0 < BACKOFF_MIN_SECS <= BACKOFF_MAX_SECS (got {} and {})",
                self.backoff_min_secs, self.backoff_max_secs
            )));
        }
        if !self.workload.config_mount_path.starts_with('/') {
            return Err(ControllerError::InvalidConfig(format!(
                "SUPERVISOR_CONFIG_MOUNT_PATH must be absolute (got {})",
                self.workload.config_mount_path
            )));
        }
        Ok(())
    }
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{} has invalid value {:?}: {}", key, raw, e))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ControllerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.target_namespace, "default");
        assert_eq!(config.finalizer, DEFAULT_FINALIZER);
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("WATCH_NAMESPACE", "apps"),
            ("TARGET_NAMESPACE", "workloads"),
            ("SUPERVISOR_IMAGE", "registry.local/supervisord:4.2"),
            ("RECONCILE_CONCURRENCY", "8"),
            ("RESYNC_INTERVAL_SECS", "60"),
        ]))
        .unwrap();
        assert_eq!(config.watch_namespace.as_deref(), Some("apps"));
        assert_eq!(config.target_namespace, "workloads");
        assert_eq!(config.workload.image, "registry.local/supervisord:4.2");
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.resync_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_value_is_unset() {
        let config = ControllerConfig::from_lookup(lookup(&[("TARGET_NAMESPACE", "  ")])).unwrap();
        assert_eq!(config.target_namespace, "default");
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = ControllerConfig::from_lookup(lookup(&[("RECONCILE_CONCURRENCY", "many")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("RECONCILE_CONCURRENCY")));
    }

    #[test]
    fn test_inverted_backoff_bounds_rejected() {
        let err = ControllerConfig::from_lookup(lookup(&[
            ("BACKOFF_MIN_SECS", "60"),
            ("BACKOFF_MAX_SECS", "10"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }

    #[test]
    fn test_relative_mount_path_rejected() {
        let err = ControllerConfig::from_lookup(lookup(&[("SUPERVISOR_CONFIG_MOUNT_PATH", "conf.d")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
