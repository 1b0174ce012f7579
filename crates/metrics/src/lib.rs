//! Operation-outcome recording: a bounded ring buffer of samples with
//! windowed aggregation and a periodic reporter task.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub buffer_size: usize,
    pub report_interval: Duration,
    pub report_window: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            report_interval: Duration::from_secs(300),
            report_window: Duration::from_secs(3600),
        }
    }
}

/// One recorded operation outcome. Never mutated after creation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MetricSample {
    pub operation: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub platform: Option<String>,
    pub cache_hit: Option<bool>,
    pub items_fetched: Option<usize>,
}

impl MetricSample {
    pub fn duration_ms(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MetricsReport {
    pub total_operations: usize,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub cache_hit_rate: f64,
    pub counts_by_operation: HashMap<String, usize>,
    pub counts_by_platform: HashMap<String, usize>,
    pub error_count: usize,
}

/// Bounded sample buffer. Insertion beyond capacity drops the oldest sample,
/// so aggregation always reflects the most recent activity.
pub struct MetricsRecorder {
    samples: Mutex<VecDeque<MetricSample>>,
    buffer_size: usize,
}

impl MetricsRecorder {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(buffer_size)),
            buffer_size,
        }
    }

    pub fn record(&self, sample: MetricSample) {
        metrics::counter!("scan_operations_total", 1);
        if !sample.success {
            metrics::counter!("scan_operation_errors_total", 1);
        }
        if let Some(duration_ms) = sample.duration_ms() {
            metrics::histogram!("scan_operation_duration_ms", duration_ms);
        }

        let mut samples = self.samples.lock();
        if samples.len() >= self.buffer_size {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Aggregate the samples whose start falls inside the trailing `window`.
    pub fn aggregate(&self, window: Duration) -> MetricsReport {
        let span = chrono::Duration::from_std(window)
            .unwrap_or_else(|_| chrono::Duration::max_value());
        let cutoff = Utc::now()
            .checked_sub_signed(span)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let samples = self.samples.lock();
        let recent: Vec<&MetricSample> = samples
            .iter()
            .filter(|sample| sample.started_at >= cutoff)
            .collect();

        let total = recent.len();
        let successes = recent.iter().filter(|sample| sample.success).count();
        let durations: Vec<f64> = recent.iter().filter_map(|sample| sample.duration_ms()).collect();
        let cache_lookups = recent.iter().filter(|sample| sample.cache_hit.is_some()).count();
        let cache_hits = recent
            .iter()
            .filter(|sample| sample.cache_hit == Some(true))
            .count();

        let mut counts_by_operation: HashMap<String, usize> = HashMap::new();
        let mut counts_by_platform: HashMap<String, usize> = HashMap::new();
        for sample in &recent {
            *counts_by_operation.entry(sample.operation.clone()).or_insert(0) += 1;
            if let Some(platform) = &sample.platform {
                *counts_by_platform.entry(platform.clone()).or_insert(0) += 1;
            }
        }

        MetricsReport {
            total_operations: total,
            success_rate: if total == 0 {
                1.0
            } else {
                successes as f64 / total as f64
            },
            average_duration_ms: if durations.is_empty() {
                0.0
            } else {
                durations.iter().sum::<f64>() / durations.len() as f64
            },
            cache_hit_rate: if cache_lookups == 0 {
                0.0
            } else {
                cache_hits as f64 / cache_lookups as f64
            },
            counts_by_operation,
            counts_by_platform,
            error_count: total - successes,
        }
    }
}

/// Periodically aggregate the trailing window and publish the report on a
/// bounded channel. Publishing is lossy (`try_send`) so a slow or absent
/// consumer never blocks the recorder's callers.
pub fn spawn_reporter(
    recorder: Arc<MetricsRecorder>,
    config: &MetricsConfig,
) -> (JoinHandle<()>, mpsc::Receiver<MetricsReport>) {
    let (tx, rx) = mpsc::channel(8);
    let report_interval = config.report_interval;
    let report_window = config.report_window;

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(report_interval);
        // The first tick completes immediately; reports start one full
        // interval after spawn.
        interval.tick().await;
        loop {
            interval.tick().await;
            let report = recorder.aggregate(report_window);
            info!(
                "metrics report: {} operations, {:.1}% success, {:.1}% cache hits, {} errors",
                report.total_operations,
                report.success_rate * 100.0,
                report.cache_hit_rate * 100.0,
                report.error_count
            );
            if tx.try_send(report).is_err() {
                debug!("metrics report dropped: channel full or consumer gone");
            }
        }
    });

    (handle, rx)
}
