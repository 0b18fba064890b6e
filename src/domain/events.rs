//! Event types streamed to the calling process during a crawl
//!
//! The caller reads stdout line by line; every successfully persisted
//! product produces one JSON `ProgressEvent` line.

use serde::{Deserialize, Serialize};

/// Per-item progress signal consumed by the boundary process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub index: usize,
    pub total: usize,
    pub asin: String,
    pub url: String,
    pub status: ProgressStatus,
}

impl ProgressEvent {
    /// Event for a product that was written to the store
    pub fn updated(index: usize, total: usize, asin: &str, url: &str) -> Self {
        Self {
            kind: "progress".to_string(),
            index,
            total,
            asin: asin.to_string(),
            url: url.to_string(),
            status: ProgressStatus::Updated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Updated,
}

/// Lifecycle of one queue item inside the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlItemState {
    Pending,
    Fetching,
    Extracting,
    Success,
    NotFound,
    Error,
}

impl std::fmt::Display for CrawlItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrawlItemState::Pending => write!(f, "pending"),
            CrawlItemState::Fetching => write!(f, "fetching"),
            CrawlItemState::Extracting => write!(f, "extracting"),
            CrawlItemState::Success => write!(f, "success"),
            CrawlItemState::NotFound => write!(f, "not-found"),
            CrawlItemState::Error => write!(f, "error"),
        }
    }
}

/// Aggregate result of one orchestrator run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSummary {
    /// Distinct URLs queued
    pub total: usize,
    /// URLs persisted successfully
    pub succeeded: usize,
    /// URLs dropped after exhausting the requeue budget
    pub dropped: usize,
    /// Items processed, retries included
    pub processed: usize,
}

impl CrawlSummary {
    /// A run succeeds when at least one URL reached the store
    pub fn is_success(&self) -> bool {
        self.succeeded > 0
    }
}

impl std::fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Successfully processed {}/{} URLs", self.succeeded, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_wire_format() {
        let event = ProgressEvent::updated(3, 10, "AAA111", "https://example.com/dp/AAA111");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "progress");
        assert_eq!(json["index"], 3);
        assert_eq!(json["total"], 10);
        assert_eq!(json["asin"], "AAA111");
        assert_eq!(json["url"], "https://example.com/dp/AAA111");
        assert_eq!(json["status"], "updated");
    }

    #[test]
    fn test_summary_success_requires_one_persisted_url() {
        let mut summary = CrawlSummary { total: 3, ..Default::default() };
        assert!(!summary.is_success());
        summary.succeeded = 1;
        assert!(summary.is_success());
        assert_eq!(summary.to_string(), "Successfully processed 1/3 URLs");
    }
}
