//! Orchestrator configuration. Every knob has a default; no external
//! configuration is required.

use socialscan_cache::CacheConfig;
use socialscan_metrics::MetricsConfig;
use socialscan_resilience::{BreakerConfig, RetryPolicy};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for a whole scan pipeline.
    pub scan_timeout: Duration,
    /// How long finished scans are retained before the cleanup sweep drops them.
    pub scan_retention: Duration,
    /// Shorter retention for failed scans.
    pub failed_scan_retention: Duration,
    pub cleanup_interval: Duration,
    pub post_cache: CacheConfig,
    pub result_cache: CacheConfig,
    pub breaker: BreakerConfig,
    pub retry: RetryPolicy,
    pub metrics: MetricsConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(300),
            scan_retention: Duration::from_secs(24 * 60 * 60),
            failed_scan_retention: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60 * 60),
            post_cache: CacheConfig {
                max_entries: 500,
                default_ttl: Duration::from_secs(600),
            },
            result_cache: CacheConfig {
                max_entries: 1000,
                default_ttl: Duration::from_secs(24 * 60 * 60),
            },
            breaker: BreakerConfig::default(),
            retry: RetryPolicy::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
