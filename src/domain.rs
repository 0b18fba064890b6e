//! Domain module - Core business logic and entities
//!
//! This module contains the product records produced by the crawler,
//! progress events streamed to the caller, and the persistence interface
//! the crawl orchestrator depends on.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod errors;
pub mod events;
pub mod product;
pub mod repositories;

// Re-export commonly used items for convenience
pub use errors::{CrawlError, InputError};
pub use events::{CrawlItemState, CrawlSummary, ProgressEvent, ProgressStatus};
pub use product::{ExistingProduct, ProductRecord, RankHistoryEntry, StoredProduct};
pub use repositories::{ProductStore, SaveOutcome};
