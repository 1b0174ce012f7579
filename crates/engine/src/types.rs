//! Domain types for scan requests, results, and fetched content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Tiktok,
    Instagram,
    Youtube,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single piece of fetched content. Engagement counters are raw; scoring
/// is the analysis collaborator's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub platform: Platform,
    pub caption: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub views: u64,
}

/// What to scan. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    pub platforms: Vec<Platform>,
    pub lookback_days: u32,
    pub include_own_posts: bool,
    pub competitor_ids: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            platforms: Vec::new(),
            lookback_days: 30,
            include_own_posts: true,
            competitor_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakTime {
    pub hour: u8,
    pub engagement_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetrics {
    pub total_posts: usize,
    pub average_engagement: f64,
    pub peak_times: Vec<PeakTime>,
    pub top_performing_posts: Vec<Post>,
}

/// Lifecycle record for one scan. Owned by the orchestrator's background
/// task while active; immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: String,
    pub user_id: String,
    pub platforms: Vec<Platform>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: ScanStatus,
    pub metrics: Option<ScanMetrics>,
    pub error: Option<String>,
}
