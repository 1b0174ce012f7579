//! Collaborator ports and engine errors.

use crate::types::{PeakTime, Platform, Post};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Scan timed out after {0}ms")]
    ScanTimeout(u64),

    #[error("Orchestrator has been destroyed")]
    Destroyed,
}

/// Per-platform data-source adapter. Implemented by the concrete API
/// clients; any error is treated as retryable by the orchestrator.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Platform this adapter serves.
    fn platform(&self) -> Platform;

    async fn get_user_posts(
        &self,
        user_id: &str,
        lookback_days: u32,
    ) -> Result<Vec<Post>, EngineError>;

    async fn get_competitor_posts(
        &self,
        competitor_id: &str,
        lookback_days: u32,
    ) -> Result<Vec<Post>, EngineError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub average_engagement: f64,
    pub peak_times: Vec<PeakTime>,
    pub top_performing_posts: Vec<Post>,
}

/// Statistical analysis over merged posts. The scoring formulas live with
/// the implementor; the orchestrator only forwards the merged item list.
pub trait PostAnalyzer: Send + Sync {
    fn analyze(&self, posts: &[Post]) -> Result<AnalysisSummary, EngineError>;
}
