//! Controller configuration read from the environment

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Runtime settings for the reconciliation pipeline
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Name of this cluster, stamped on every object created remotely
    pub cluster_name: String,
    /// Tenant owning the realized objects
    pub tenant: String,
    /// GatewayClasses whose controllerName equals this are claimed
    pub controller_name: String,
    /// Periodic full resync; `None` disables the timer
    pub full_sync_interval: Option<Duration>,
    /// Parallel workers draining the graph/rest queue
    pub graph_workers: usize,
    /// Parallel workers draining the status queue
    pub status_workers: usize,
    pub fast_retry_interval: Duration,
    /// Fast attempts before a key escalates to the slow class
    pub fast_retry_max_attempts: u32,
    pub slow_retry_interval: Duration,
    /// Bound on a single call to the load balancer
    pub rest_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// Tear down every realized object at startup and stop
    pub delete_config: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cluster_name: "cluster".to_string(),
            tenant: "admin".to_string(),
            controller_name: "lb.example.com/gateway-controller".to_string(),
            full_sync_interval: Some(Duration::from_secs(1800)),
            graph_workers: 8,
            status_workers: 8,
            fast_retry_interval: Duration::from_millis(500),
            fast_retry_max_attempts: 5,
            slow_retry_interval: Duration::from_secs(300),
            rest_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(60),
            delete_config: false,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let cluster_name = lookup("CLUSTER_NAME").unwrap_or(defaults.cluster_name);
        if cluster_name.trim().is_empty() {
            return Err(ConfigError::Empty("CLUSTER_NAME"));
        }

        let full_sync_secs: u64 = parse(&lookup, "FULL_SYNC_INTERVAL", 1800)?;

        Ok(Self {
            cluster_name,
            tenant: lookup("TENANT").unwrap_or(defaults.tenant),
            controller_name: lookup("GATEWAY_CONTROLLER_NAME").unwrap_or(defaults.controller_name),
            full_sync_interval: (full_sync_secs > 0).then(|| Duration::from_secs(full_sync_secs)),
            graph_workers: parse(&lookup, "GRAPH_WORKERS", defaults.graph_workers)?.max(1),
            status_workers: parse(&lookup, "STATUS_WORKERS", defaults.status_workers)?.max(1),
            fast_retry_interval: Duration::from_millis(parse(&lookup, "FAST_RETRY_INTERVAL_MS", 500)?),
            fast_retry_max_attempts: parse(
                &lookup,
                "FAST_RETRY_MAX_ATTEMPTS",
                defaults.fast_retry_max_attempts,
            )?,
            slow_retry_interval: Duration::from_secs(parse(&lookup, "SLOW_RETRY_INTERVAL", 300)?),
            rest_timeout: Duration::from_secs(parse(&lookup, "REST_TIMEOUT", 30)?),
            shutdown_timeout: Duration::from_secs(parse(&lookup, "SHUTDOWN_TIMEOUT", 60)?),
            delete_config: parse(&lookup, "DELETE_CONFIG", false)?,
        })
    }

    /// Marker value stamped as `created_by` on remote objects
    pub fn created_by(&self) -> String {
        format!("lb-controller-{}", self.cluster_name)
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        _ => Ok(default),
    }
}
