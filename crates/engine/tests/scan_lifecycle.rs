//! End-to-end scan lifecycle tests with scripted data sources.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use chrono::Utc;
use socialscan_cache::EvictionCache;
use socialscan_engine::*;
use socialscan_metrics::MetricsRecorder;
use socialscan_resilience::{CircuitBreakerRegistry, RetryPolicy};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn make_posts(platform: Platform, owner: &str, count: usize) -> Vec<Post> {
    (0..count)
        .map(|i| Post {
            id: format!("{}_{}", owner, i),
            platform,
            caption: Some(format!("post {} from {}", i, owner)),
            posted_at: Utc::now() - chrono::Duration::hours(i as i64),
            likes: 10 * (i as u64 + 1),
            comments: 2 * i as u64,
            shares: i as u64,
            views: 100 * (i as u64 + 1),
        })
        .collect()
}

/// Data source with per-identity scripted outcomes and an upstream call
/// counter.
struct ScriptedSource {
    platform: Platform,
    posts: HashMap<String, usize>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(platform: Platform) -> Self {
        Self {
            platform,
            posts: HashMap::new(),
            failing: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn with_posts(mut self, id: &str, count: usize) -> Self {
        self.posts.insert(id.to_string(), count);
        self
    }

    fn with_failure(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    fn fetch(&self, id: &str) -> Result<Vec<Post>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(id) {
            return Err(EngineError::Source(format!("{} is unavailable", id)));
        }
        Ok(make_posts(
            self.platform,
            id,
            self.posts.get(id).copied().unwrap_or(0),
        ))
    }
}

#[async_trait]
impl PostSource for ScriptedSource {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn get_user_posts(
        &self,
        user_id: &str,
        _lookback_days: u32,
    ) -> Result<Vec<Post>, EngineError> {
        self.fetch(user_id)
    }

    async fn get_competitor_posts(
        &self,
        competitor_id: &str,
        _lookback_days: u32,
    ) -> Result<Vec<Post>, EngineError> {
        self.fetch(competitor_id)
    }
}

/// Source whose fetches never resolve within any reasonable deadline.
struct HangingSource(Platform);

#[async_trait]
impl PostSource for HangingSource {
    fn platform(&self) -> Platform {
        self.0
    }

    async fn get_user_posts(
        &self,
        _user_id: &str,
        _lookback_days: u32,
    ) -> Result<Vec<Post>, EngineError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![])
    }

    async fn get_competitor_posts(
        &self,
        _competitor_id: &str,
        _lookback_days: u32,
    ) -> Result<Vec<Post>, EngineError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![])
    }
}

struct EngagementAnalyzer;

impl PostAnalyzer for EngagementAnalyzer {
    fn analyze(&self, posts: &[Post]) -> Result<AnalysisSummary, EngineError> {
        let total: u64 = posts.iter().map(|p| p.likes + p.comments + p.shares).sum();
        let average = if posts.is_empty() {
            0.0
        } else {
            total as f64 / posts.len() as f64
        };

        let mut ranked: Vec<Post> = posts.to_vec();
        ranked.sort_by(|a, b| b.likes.cmp(&a.likes));
        ranked.truncate(10);

        Ok(AnalysisSummary {
            average_engagement: average,
            peak_times: vec![PeakTime {
                hour: 18,
                engagement_score: average,
            }],
            top_performing_posts: ranked,
        })
    }
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        scan_timeout: Duration::from_secs(2),
        ..OrchestratorConfig::default()
    }
}

struct Harness {
    orchestrator: ScanOrchestrator,
    result_cache: Arc<EvictionCache<String, ScanResult>>,
    metrics: Arc<MetricsRecorder>,
}

fn harness(sources: Vec<Arc<dyn PostSource>>, config: OrchestratorConfig) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let post_cache = Arc::new(EvictionCache::new(config.post_cache.clone()));
    let result_cache = Arc::new(EvictionCache::new(config.result_cache.clone()));
    let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker.clone()));
    let metrics = Arc::new(MetricsRecorder::new(config.metrics.buffer_size));

    let orchestrator = ScanOrchestrator::new(
        sources,
        Arc::new(EngagementAnalyzer),
        post_cache,
        Arc::clone(&result_cache),
        breakers,
        Arc::clone(&metrics),
        config,
    );

    Harness {
        orchestrator,
        result_cache,
        metrics,
    }
}

async fn wait_for_terminal(orchestrator: &ScanOrchestrator, scan_id: &str) -> ScanResult {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(result) = orchestrator.get_scan_result(scan_id).await {
            if result.status.is_terminal() {
                return result;
            }
        }
        assert!(
            Instant::now() < deadline,
            "scan {} did not reach a terminal state in time",
            scan_id
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_end_to_end_scan() {
    // Own posts succeed with 4 items, c1 always fails, c2 succeeds with 5.
    let source = Arc::new(
        ScriptedSource::new(Platform::Tiktok)
            .with_posts("u1", 4)
            .with_posts("c2", 5)
            .with_failure("c1"),
    );
    let harness = harness(vec![source as Arc<dyn PostSource>], fast_config());

    let scan_id = harness
        .orchestrator
        .start_scan(
            "u1",
            ScanOptions {
                platforms: vec![Platform::Tiktok],
                lookback_days: 7,
                include_own_posts: true,
                competitor_ids: vec!["c1".to_string(), "c2".to_string()],
            },
        )
        .await
        .unwrap();

    let result = wait_for_terminal(&harness.orchestrator, &scan_id).await;

    assert_eq!(result.status, ScanStatus::Completed);
    assert!(result.error.is_none());
    assert!(result.finished_at.is_some());

    let metrics = result.metrics.unwrap();
    assert_eq!(metrics.total_posts, 9);
    assert!(metrics.average_engagement > 0.0);
    assert_eq!(metrics.top_performing_posts.len(), 9);
    assert_eq!(metrics.peak_times.len(), 1);
}

#[tokio::test]
async fn test_competitor_failure_is_isolated() {
    let source = Arc::new(
        ScriptedSource::new(Platform::Tiktok)
            .with_posts("c2", 2)
            .with_posts("c3", 3)
            .with_failure("c1"),
    );
    let harness = harness(vec![source as Arc<dyn PostSource>], fast_config());

    let scan_id = harness
        .orchestrator
        .start_scan(
            "u1",
            ScanOptions {
                platforms: vec![Platform::Tiktok],
                include_own_posts: false,
                competitor_ids: vec!["c1".to_string(), "c2".to_string(), "c3".to_string()],
                ..ScanOptions::default()
            },
        )
        .await
        .unwrap();

    let result = wait_for_terminal(&harness.orchestrator, &scan_id).await;

    assert_eq!(result.status, ScanStatus::Completed);
    assert_eq!(result.metrics.unwrap().total_posts, 5);
}

#[tokio::test]
async fn test_scan_times_out() {
    let config = OrchestratorConfig {
        scan_timeout: Duration::from_millis(100),
        ..fast_config()
    };
    let harness = harness(vec![Arc::new(HangingSource(Platform::Tiktok)) as Arc<dyn PostSource>], config);

    let started = Instant::now();
    let scan_id = harness
        .orchestrator
        .start_scan(
            "u1",
            ScanOptions {
                platforms: vec![Platform::Tiktok],
                ..ScanOptions::default()
            },
        )
        .await
        .unwrap();

    let result = wait_for_terminal(&harness.orchestrator, &scan_id).await;

    assert_eq!(result.status, ScanStatus::Failed);
    assert!(result.error.unwrap().contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_result_visible_from_submission() {
    let harness = harness(vec![Arc::new(HangingSource(Platform::Tiktok)) as Arc<dyn PostSource>], fast_config());

    let scan_id = harness
        .orchestrator
        .start_scan(
            "u1",
            ScanOptions {
                platforms: vec![Platform::Tiktok],
                ..ScanOptions::default()
            },
        )
        .await
        .unwrap();

    let result = harness
        .orchestrator
        .get_scan_result(&scan_id)
        .await
        .unwrap();
    assert!(!result.status.is_terminal());
    assert_eq!(result.user_id, "u1");
    assert!(result.finished_at.is_none());
}

#[tokio::test]
async fn test_unregistered_platform_is_skipped() {
    let source = Arc::new(ScriptedSource::new(Platform::Tiktok).with_posts("u1", 3));
    let harness = harness(vec![source as Arc<dyn PostSource>], fast_config());

    let scan_id = harness
        .orchestrator
        .start_scan(
            "u1",
            ScanOptions {
                platforms: vec![Platform::Tiktok, Platform::Instagram],
                ..ScanOptions::default()
            },
        )
        .await
        .unwrap();

    let result = wait_for_terminal(&harness.orchestrator, &scan_id).await;

    assert_eq!(result.status, ScanStatus::Completed);
    assert_eq!(result.metrics.unwrap().total_posts, 3);
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let config = OrchestratorConfig {
        scan_retention: Duration::ZERO,
        ..fast_config()
    };
    let source = Arc::new(ScriptedSource::new(Platform::Tiktok).with_posts("u1", 1));
    let harness = harness(vec![source as Arc<dyn PostSource>], config);

    let scan_id = harness
        .orchestrator
        .start_scan(
            "u1",
            ScanOptions {
                platforms: vec![Platform::Tiktok],
                ..ScanOptions::default()
            },
        )
        .await
        .unwrap();
    wait_for_terminal(&harness.orchestrator, &scan_id).await;

    assert_eq!(harness.orchestrator.cleanup_expired_scans().await, 1);
    assert_eq!(harness.orchestrator.cleanup_expired_scans().await, 0);
    assert!(harness.orchestrator.get_scan_result(&scan_id).await.is_none());
}

#[tokio::test]
async fn test_failed_scans_expire_sooner() {
    let config = OrchestratorConfig {
        scan_timeout: Duration::from_millis(50),
        failed_scan_retention: Duration::ZERO,
        ..fast_config()
    };
    let harness = harness(vec![Arc::new(HangingSource(Platform::Tiktok)) as Arc<dyn PostSource>], config);

    let scan_id = harness
        .orchestrator
        .start_scan(
            "u1",
            ScanOptions {
                platforms: vec![Platform::Tiktok],
                ..ScanOptions::default()
            },
        )
        .await
        .unwrap();
    let result = wait_for_terminal(&harness.orchestrator, &scan_id).await;
    assert_eq!(result.status, ScanStatus::Failed);

    assert_eq!(harness.orchestrator.cleanup_expired_scans().await, 1);
    assert!(harness.orchestrator.get_scan_result(&scan_id).await.is_none());
}

#[tokio::test]
async fn test_read_repair_restores_result_cache() {
    let source = Arc::new(ScriptedSource::new(Platform::Tiktok).with_posts("u1", 2));
    let harness = harness(vec![source as Arc<dyn PostSource>], fast_config());

    let scan_id = harness
        .orchestrator
        .start_scan(
            "u1",
            ScanOptions {
                platforms: vec![Platform::Tiktok],
                ..ScanOptions::default()
            },
        )
        .await
        .unwrap();
    wait_for_terminal(&harness.orchestrator, &scan_id).await;

    // Simulate a cache-side loss; the in-memory map must repair it.
    assert!(harness.result_cache.delete(scan_id.as_str()));
    let result = harness
        .orchestrator
        .get_scan_result(&scan_id)
        .await
        .unwrap();
    assert_eq!(result.status, ScanStatus::Completed);
    assert!(harness.result_cache.has(scan_id.as_str()));
}

#[tokio::test]
async fn test_fetch_metrics_are_recorded() {
    let source = Arc::new(
        ScriptedSource::new(Platform::Tiktok)
            .with_posts("u1", 2)
            .with_failure("c1"),
    );
    let harness = harness(vec![source as Arc<dyn PostSource>], fast_config());

    let scan_id = harness
        .orchestrator
        .start_scan(
            "u1",
            ScanOptions {
                platforms: vec![Platform::Tiktok],
                competitor_ids: vec!["c1".to_string()],
                ..ScanOptions::default()
            },
        )
        .await
        .unwrap();
    wait_for_terminal(&harness.orchestrator, &scan_id).await;

    let report = harness.metrics.aggregate(Duration::from_secs(3600));
    assert_eq!(report.total_operations, 2);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.counts_by_operation["user_posts"], 1);
    assert_eq!(report.counts_by_operation["competitor_posts"], 1);
    assert_eq!(report.counts_by_platform["tiktok"], 2);
}
