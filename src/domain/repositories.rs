//! Repository interfaces for product rank tracking
//!
//! Contains the trait the crawl orchestrator writes through, so the
//! orchestration loop can run against SQLite or an in-memory double.

use async_trait::async_trait;
use anyhow::Result;

use crate::domain::product::ProductRecord;

/// What a successful save did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    /// True when the product row did not exist before this save
    pub created: bool,
    /// Rank stored before this save, if the product already existed
    pub previous_rank: Option<i64>,
    /// True when a rank-history entry was appended
    pub rank_recorded: bool,
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Upsert the product and append rank history when the rank moved
    async fn save_observation(&self, record: &ProductRecord) -> Result<SaveOutcome>;
}
