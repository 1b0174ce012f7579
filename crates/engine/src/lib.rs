//! Scan orchestration engine.
//!
//! Fans out to per-platform social data sources behind circuit breaking,
//! bounded retry, and caching, merges the results, and produces a
//! consolidated analysis within a scan-level deadline.

pub mod config;
pub mod interfaces;
pub mod orchestrator;
pub mod types;

pub use config::OrchestratorConfig;
pub use interfaces::{AnalysisSummary, EngineError, PostAnalyzer, PostSource};
pub use orchestrator::ScanOrchestrator;
pub use types::{PeakTime, Platform, Post, ScanMetrics, ScanOptions, ScanResult, ScanStatus};
