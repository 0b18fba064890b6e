//! Error types for crawl outcomes and the input boundary

use thiserror::Error;

use crate::domain::product::{ERROR_TITLE, NOT_FOUND_TITLE};

/// Per-URL failure produced by the fetch strategies or persistence.
///
/// None of these abort a batch; the orchestrator decides whether the URL
/// is requeued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    #[error("Product not found: {url}")]
    NotFound { url: String },

    #[error("Processing error: blocked by captcha ({engine})")]
    Blocked { engine: &'static str, attempts: u32 },

    #[error("Processing error: {0}")]
    Extraction(String),

    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("Processing error after retries")]
    Exhausted,

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Database error: {0}")]
    Persistence(String),
}

impl CrawlError {
    /// Whether this failure came from anti-automation blocking
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    /// Whether the catalog reported the page as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Title of the sentinel record this failure maps to at the boundary
    pub fn sentinel_title(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => NOT_FOUND_TITLE,
            _ => ERROR_TITLE,
        }
    }
}

/// Problems with the URL batch read from stdin; these are fatal
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URLs input: expected a JSON array")]
    NotAnArray,

    #[error("Invalid URLs input: the array is empty")]
    Empty,

    #[error("Invalid URLs input: element {index} is not a string")]
    NonStringElement { index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_titles() {
        let not_found = CrawlError::NotFound { url: "https://example.com/dp/X".into() };
        assert_eq!(not_found.sentinel_title(), "Product Not Found");
        assert!(not_found.is_not_found());

        let blocked = CrawlError::Blocked { engine: "requests", attempts: 6 };
        assert_eq!(blocked.sentinel_title(), "Error Processing");
        assert!(blocked.is_blocked());
        assert_eq!(blocked.to_string(), "Processing error: blocked by captcha (requests)");
    }
}
