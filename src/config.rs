//! Process-wide discovery configuration, parsed from environment
//! variables the way the teacher's `ClusterConfig::from_env` is.

use std::time::Duration;

/// Tunables for the discovery subsystem. All fields have defaults, so
/// `DiscoveryConfig::from_env()` is always constructible even when none
/// of the environment variables below are set.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Directory (etcd) endpoints, e.g. `["http://127.0.0.1:2379"]`.
    pub endpoints: Vec<String>,

    /// Environment namespace services are registered/resolved under.
    pub environment: String,

    /// Lease TTL for a registered descriptor. spec.md §3: `NodeExpiry`,
    /// 10 seconds nominal.
    pub node_expiry: Duration,

    /// Subscription reconciliation period — how often `get_prefix` is
    /// re-run as a belt-and-braces check against missed watch events.
    pub reconcile_interval: Duration,

    /// Keepalive/registration retry backoff after a stream break.
    pub retry_backoff: Duration,

    /// Standard per-call deadline used by the context helpers.
    pub standard_timeout: Duration,

    /// Short per-call deadline (health checks, fast paths).
    pub short_timeout: Duration,

    /// Virtual points inserted per physical node on the hash ring.
    pub ring_replicas: usize,

    /// Upper bound on [`crate::broadcast::broadcast`] iteration.
    pub broadcast_cap: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:2379".to_string()],
            environment: "dev".to_string(),
            node_expiry: Duration::from_secs(10),
            reconcile_interval: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(1),
            standard_timeout: Duration::from_secs(8),
            short_timeout: Duration::from_secs(2),
            ring_replicas: 20,
            broadcast_cap: 10,
        }
    }
}

impl DiscoveryConfig {
    /// Parse configuration from environment variables, falling back to
    /// [`Default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let endpoints = std::env::var("DISCOVERY_ENDPOINTS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.endpoints);

        let environment =
            std::env::var("DISCOVERY_ENV").unwrap_or(defaults.environment);

        Self {
            endpoints,
            environment,
            ..defaults
        }
    }

    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:2379".to_string()],
            environment: "test".to_string(),
            ..Self::default()
        }
    }
}
