use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::info;

/// Counters for one scraping run
#[derive(Debug, Clone)]
pub struct RunMetrics {
    /// Start time of the run
    start_time: DateTime<Utc>,

    /// Monotonic start, for the elapsed time
    started: Instant,

    /// Queries taken from the due set
    processed: usize,

    /// Queries whose page was stored
    succeeded: usize,

    /// Queries that timed out, found nothing or failed to store
    failed: usize,

    /// Queries rejected before crawling
    skipped: usize,
}

/// Final numbers for a run, logged and printed as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub queries_processed: usize,
    pub successful_scrapes: usize,
    pub failed_scrapes: usize,
    pub skipped_queries: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Utc::now(),
            started: Instant::now(),
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        }
    }

    pub fn record_processed(&mut self) {
        self.processed += 1;
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Stop the clock and produce the summary
    pub fn finalize(self, run_id: impl Into<String>) -> RunSummary {
        RunSummary {
            run_id: run_id.into(),
            queries_processed: self.processed,
            successful_scrapes: self.succeeded,
            failed_scrapes: self.failed,
            skipped_queries: self.skipped,
            start_time: self.start_time,
            end_time: Utc::now(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummary {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            processed = self.queries_processed,
            succeeded = self.successful_scrapes,
            failed = self.failed_scrapes,
            skipped = self.skipped_queries,
            elapsed = ?self.elapsed(),
            "Scraping run complete"
        );
    }
}

/// Request timer for measuring request durations
pub struct RequestTimer {
    /// Start time of the request
    start: Instant,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// End timing and get the duration in milliseconds
    pub fn end(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_add_up() {
        let mut metrics = RunMetrics::new();
        for _ in 0..4 {
            metrics.record_processed();
        }
        metrics.record_success();
        metrics.record_success();
        metrics.record_failure();
        metrics.record_skipped();

        let summary = metrics.finalize("run-1");
        assert_eq!(summary.queries_processed, 4);
        assert_eq!(
            summary.queries_processed,
            summary.successful_scrapes + summary.failed_scrapes + summary.skipped_queries
        );
        assert!(summary.end_time >= summary.start_time);
    }

    #[test]
    fn test_summary_serializes() {
        let summary = RunMetrics::new().finalize("run-2");
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["run_id"], "run-2");
        assert_eq!(json["queries_processed"], 0);
    }
}
