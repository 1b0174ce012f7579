//! Scan orchestrator - accepts scan requests, fans out to data sources
//! behind breaker/retry/cache, and drives each scan to a terminal state
//! within a bounded deadline.

use crate::config::OrchestratorConfig;
use crate::interfaces::{EngineError, PostAnalyzer, PostSource};
use crate::types::{Platform, Post, ScanMetrics, ScanOptions, ScanResult, ScanStatus};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use socialscan_cache::EvictionCache;
use socialscan_metrics::{spawn_reporter, MetricSample, MetricsRecorder, MetricsReport};
use socialscan_resilience::{with_retry, CircuitBreakerRegistry};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy)]
enum FetchKind {
    UserPosts,
    CompetitorPosts,
}

impl FetchKind {
    fn as_str(&self) -> &'static str {
        match self {
            FetchKind::UserPosts => "user_posts",
            FetchKind::CompetitorPosts => "competitor_posts",
        }
    }
}

fn generate_scan_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!(
        "scan_{}_{}",
        Utc::now().timestamp_millis(),
        suffix.to_lowercase()
    )
}

struct Inner {
    sources: HashMap<Platform, Arc<dyn PostSource>>,
    analyzer: Arc<dyn PostAnalyzer>,
    post_cache: Arc<EvictionCache<String, Vec<Post>>>,
    result_cache: Arc<EvictionCache<String, ScanResult>>,
    breakers: Arc<CircuitBreakerRegistry>,
    metrics: Arc<MetricsRecorder>,
    results: RwLock<HashMap<String, ScanResult>>,
    config: OrchestratorConfig,
}

/// Top-level coordinator. Shared services are injected at construction so
/// hosts and tests control their lifetimes; background loops start via
/// [`ScanOrchestrator::start`] and stop via [`ScanOrchestrator::destroy`].
pub struct ScanOrchestrator {
    inner: Arc<Inner>,
    background: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    reports: parking_lot::Mutex<Option<mpsc::Receiver<MetricsReport>>>,
    destroyed: AtomicBool,
}

impl ScanOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sources: Vec<Arc<dyn PostSource>>,
        analyzer: Arc<dyn PostAnalyzer>,
        post_cache: Arc<EvictionCache<String, Vec<Post>>>,
        result_cache: Arc<EvictionCache<String, ScanResult>>,
        breakers: Arc<CircuitBreakerRegistry>,
        metrics: Arc<MetricsRecorder>,
        config: OrchestratorConfig,
    ) -> Self {
        let sources: HashMap<Platform, Arc<dyn PostSource>> = sources
            .into_iter()
            .map(|source| (source.platform(), source))
            .collect();

        Self {
            inner: Arc::new(Inner {
                sources,
                analyzer,
                post_cache,
                result_cache,
                breakers,
                metrics,
                results: RwLock::new(HashMap::new()),
                config,
            }),
            background: parking_lot::Mutex::new(Vec::new()),
            reports: parking_lot::Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Build the shared services from `config` and construct the
    /// orchestrator around them.
    pub fn with_defaults(
        sources: Vec<Arc<dyn PostSource>>,
        analyzer: Arc<dyn PostAnalyzer>,
        config: OrchestratorConfig,
    ) -> Self {
        let post_cache = Arc::new(EvictionCache::new(config.post_cache.clone()));
        let result_cache = Arc::new(EvictionCache::new(config.result_cache.clone()));
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker.clone()));
        let metrics = Arc::new(MetricsRecorder::new(config.metrics.buffer_size));
        Self::new(
            sources,
            analyzer,
            post_cache,
            result_cache,
            breakers,
            metrics,
            config,
        )
    }

    /// Launch the periodic background loops: the scan-retention cleanup
    /// (one run immediately, then every `cleanup_interval`) and the metrics
    /// reporter. Idempotent.
    pub fn start(&self) {
        let mut background = self.background.lock();
        if !background.is_empty() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let cleanup = tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.config.cleanup_interval);
            loop {
                interval.tick().await;
                let removed = inner.cleanup_expired_scans().await;
                if removed > 0 {
                    info!("cleanup removed {} expired scans", removed);
                }
            }
        });
        background.push(cleanup);

        let (reporter, reports) =
            spawn_reporter(Arc::clone(&self.inner.metrics), &self.inner.config.metrics);
        background.push(reporter);
        *self.reports.lock() = Some(reports);
    }

    /// Consumer end of the periodic metrics reports. Available once after
    /// [`start`](Self::start).
    pub fn metrics_reports(&self) -> Option<mpsc::Receiver<MetricsReport>> {
        self.reports.lock().take()
    }

    /// Submit a scan. The `ScanResult` is visible to readers immediately in
    /// `Pending`; the scan itself runs as an unsupervised background task
    /// whose failures are recorded on the result, never raised here.
    pub async fn start_scan(
        &self,
        user_id: &str,
        options: ScanOptions,
    ) -> Result<String, EngineError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(EngineError::Destroyed);
        }
        if user_id.is_empty() {
            return Err(EngineError::InvalidRequest(
                "user_id must be non-empty".to_string(),
            ));
        }

        let scan_id = generate_scan_id();
        let result = ScanResult {
            id: scan_id.clone(),
            user_id: user_id.to_string(),
            platforms: options.platforms.clone(),
            started_at: Utc::now(),
            finished_at: None,
            status: ScanStatus::Pending,
            metrics: None,
            error: None,
        };
        self.inner.persist_result(result).await;

        info!("scan {} submitted for user {}", scan_id, user_id);

        let inner = Arc::clone(&self.inner);
        let id = scan_id.clone();
        let owner = user_id.to_string();
        tokio::spawn(async move {
            inner.run_scan(id, owner, options).await;
        });

        Ok(scan_id)
    }

    /// Look up a scan: the result cache is preferred, the in-memory map is
    /// the fallback, and whichever store is missing the value is repaired.
    pub async fn get_scan_result(&self, scan_id: &str) -> Option<ScanResult> {
        if let Some(cached) = self.inner.result_cache.get(scan_id) {
            let mut results = self.inner.results.write().await;
            results
                .entry(scan_id.to_string())
                .or_insert_with(|| cached.clone());
            return Some(cached);
        }

        let fallback = self.inner.results.read().await.get(scan_id).cloned();
        if let Some(result) = fallback {
            self.inner.cache_result(&result);
            return Some(result);
        }
        None
    }

    /// Drop every post-cache entry namespaced under `platform` + `user_id`.
    pub fn invalidate_user_cache(&self, platform: Platform, user_id: &str) -> usize {
        let mut removed = self
            .inner
            .post_cache
            .remove_namespace(&format!("user_posts_{}_{}", platform, user_id));
        removed += self
            .inner
            .post_cache
            .remove_namespace(&format!("competitor_posts_{}_{}", platform, user_id));
        if removed > 0 {
            info!(
                "invalidated {} cached entries for {} user {}",
                removed, platform, user_id
            );
        }
        removed
    }

    /// Delete scans past their retention window from both stores and prune
    /// expired post-cache entries. Idempotent.
    pub async fn cleanup_expired_scans(&self) -> usize {
        self.inner.cleanup_expired_scans().await
    }

    /// Stop the background loops and release in-memory state. Effective
    /// exactly once; later calls are logged no-ops.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            warn!("destroy called more than once, ignoring");
            return;
        }

        for handle in self.background.lock().drain(..) {
            handle.abort();
        }
        *self.reports.lock() = None;

        self.inner.results.write().await.clear();
        self.inner.result_cache.clear();
        self.inner.post_cache.clear();
        info!("scan orchestrator destroyed");
    }
}

impl Inner {
    async fn run_scan(self: Arc<Self>, scan_id: String, user_id: String, options: ScanOptions) {
        self.transition(&scan_id, ScanStatus::InProgress).await;

        let pipeline = {
            let inner = Arc::clone(&self);
            let id = scan_id.clone();
            tokio::spawn(async move { inner.execute_pipeline(id, user_id, options).await })
        };

        // Abandon, not cancel: when the deadline wins, the spawned pipeline
        // keeps running to completion and its results are discarded.
        match tokio::time::timeout(self.config.scan_timeout, pipeline).await {
            Ok(Ok(Ok(metrics))) => self.finish_scan(&scan_id, Ok(metrics)).await,
            Ok(Ok(Err(err))) => self.finish_scan(&scan_id, Err(err.to_string())).await,
            Ok(Err(join_err)) => {
                error!("scan {} pipeline aborted: {}", scan_id, join_err);
                self.finish_scan(&scan_id, Err(format!("scan pipeline aborted: {}", join_err)))
                    .await;
            }
            Err(_) => {
                warn!("scan {} hit its deadline", scan_id);
                let timeout =
                    EngineError::ScanTimeout(self.config.scan_timeout.as_millis() as u64);
                self.finish_scan(&scan_id, Err(timeout.to_string())).await;
            }
        }
    }

    async fn execute_pipeline(
        self: Arc<Self>,
        scan_id: String,
        user_id: String,
        options: ScanOptions,
    ) -> Result<ScanMetrics, EngineError> {
        let mut all_posts: Vec<Post> = Vec::new();
        let mut seen = HashSet::new();

        for platform in options.platforms.iter().copied() {
            if !seen.insert(platform) {
                continue;
            }
            let Some(source) = self.sources.get(&platform) else {
                warn!("scan {}: no adapter registered for {}", scan_id, platform);
                continue;
            };

            if options.include_own_posts {
                let posts = self
                    .fetch_posts(
                        Arc::clone(source),
                        platform,
                        FetchKind::UserPosts,
                        user_id.clone(),
                        options.lookback_days,
                    )
                    .await;
                all_posts.extend(posts);
            }

            if !options.competitor_ids.is_empty() {
                let mut handles = Vec::with_capacity(options.competitor_ids.len());
                for competitor_id in &options.competitor_ids {
                    let inner = Arc::clone(&self);
                    let source = Arc::clone(source);
                    let competitor_id = competitor_id.clone();
                    let lookback_days = options.lookback_days;
                    handles.push(tokio::spawn(async move {
                        inner
                            .fetch_posts(
                                source,
                                platform,
                                FetchKind::CompetitorPosts,
                                competitor_id,
                                lookback_days,
                            )
                            .await
                    }));
                }
                for handle in handles {
                    match handle.await {
                        Ok(posts) => all_posts.extend(posts),
                        Err(join_err) => {
                            warn!(
                                "scan {}: competitor fetch task failed: {}",
                                scan_id, join_err
                            );
                        }
                    }
                }
            }
        }

        debug!("scan {}: merged {} posts", scan_id, all_posts.len());
        let summary = self.analyzer.analyze(&all_posts)?;

        Ok(ScanMetrics {
            total_posts: all_posts.len(),
            average_engagement: summary.average_engagement,
            peak_times: summary.peak_times,
            top_performing_posts: summary.top_performing_posts,
        })
    }

    /// One guarded fetch: breaker permission, then retried cache-or-upstream.
    /// Failures degrade to an empty result so a single identity never sinks
    /// the scan.
    async fn fetch_posts(
        &self,
        source: Arc<dyn PostSource>,
        platform: Platform,
        kind: FetchKind,
        identity: String,
        lookback_days: u32,
    ) -> Vec<Post> {
        let cache_key = format!("{}_{}_{}", kind.as_str(), platform, identity);
        let breaker_key = format!("{}_api", platform);

        if !self.breakers.can_perform_operation(&breaker_key) {
            warn!("{} refused by open circuit, returning empty result", cache_key);
            return Vec::new();
        }

        let started_at = Utc::now();
        let fetched = with_retry(&self.config.retry, &cache_key, || {
            let cache_key = cache_key.clone();
            let identity = identity.clone();
            let source = Arc::clone(&source);
            let post_cache = Arc::clone(&self.post_cache);
            async move {
                if let Some(posts) = post_cache.get(&cache_key) {
                    return Ok::<(Vec<Post>, bool), EngineError>((posts, true));
                }
                let posts = match kind {
                    FetchKind::UserPosts => source.get_user_posts(&identity, lookback_days).await?,
                    FetchKind::CompetitorPosts => {
                        source.get_competitor_posts(&identity, lookback_days).await?
                    }
                };
                post_cache.set(cache_key, posts.clone());
                Ok((posts, false))
            }
        })
        .await;

        match fetched {
            Ok((posts, from_cache)) => {
                if !from_cache {
                    self.breakers.record_success(&breaker_key);
                }
                self.metrics.record(MetricSample {
                    operation: kind.as_str().to_string(),
                    started_at,
                    finished_at: Some(Utc::now()),
                    success: true,
                    platform: Some(platform.to_string()),
                    cache_hit: Some(from_cache),
                    items_fetched: Some(posts.len()),
                });
                posts
            }
            Err(err) => {
                self.breakers.record_failure(&breaker_key);
                warn!("{} failed after retries, excluded from scan: {}", cache_key, err);
                self.metrics.record(MetricSample {
                    operation: kind.as_str().to_string(),
                    started_at,
                    finished_at: Some(Utc::now()),
                    success: false,
                    platform: Some(platform.to_string()),
                    cache_hit: Some(false),
                    items_fetched: None,
                });
                Vec::new()
            }
        }
    }

    async fn persist_result(&self, result: ScanResult) {
        self.cache_result(&result);
        self.results
            .write()
            .await
            .insert(result.id.clone(), result);
    }

    fn cache_result(&self, result: &ScanResult) {
        let ttl = match result.status {
            ScanStatus::Failed => self.config.failed_scan_retention,
            _ => self.config.scan_retention,
        };
        self.result_cache
            .set_with_ttl(result.id.clone(), result.clone(), ttl);
    }

    async fn transition(&self, scan_id: &str, status: ScanStatus) {
        let snapshot = {
            let mut results = self.results.write().await;
            let Some(result) = results.get_mut(scan_id) else {
                return;
            };
            result.status = status;
            result.clone()
        };
        debug!("scan {} -> {:?}", scan_id, status);
        self.cache_result(&snapshot);
    }

    async fn finish_scan(&self, scan_id: &str, outcome: Result<ScanMetrics, String>) {
        let snapshot = {
            let mut results = self.results.write().await;
            let Some(result) = results.get_mut(scan_id) else {
                return;
            };
            result.finished_at = Some(Utc::now());
            match outcome {
                Ok(metrics) => {
                    info!(
                        "scan {} completed with {} posts",
                        scan_id, metrics.total_posts
                    );
                    result.status = ScanStatus::Completed;
                    result.metrics = Some(metrics);
                }
                Err(message) => {
                    warn!("scan {} failed: {}", scan_id, message);
                    result.status = ScanStatus::Failed;
                    result.error = Some(message);
                }
            }
            result.clone()
        };
        self.cache_result(&snapshot);
    }

    async fn cleanup_expired_scans(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        {
            let mut results = self.results.write().await;
            results.retain(|id, result| {
                let retention = match result.status {
                    ScanStatus::Failed => self.config.failed_scan_retention,
                    _ => self.config.scan_retention,
                };
                let expired = (now - result.started_at)
                    .to_std()
                    .map(|age| age >= retention)
                    .unwrap_or(false);
                if expired {
                    self.result_cache.delete(id);
                    removed += 1;
                }
                !expired
            });
        }

        let pruned = self.post_cache.prune_expired();
        if pruned > 0 {
            debug!("pruned {} expired post cache entries", pruned);
        }
        removed
    }
}
