use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text stored for a field that could not be located on the page
pub const NOT_FOUND_TEXT: &str = "Not found";

/// Text used by sentinel records for every field
pub const NOT_AVAILABLE_TEXT: &str = "N/A";

/// Brand assumed when the byline is absent (the catalog's default seller)
pub const DEFAULT_BRAND: &str = "Amazon";

/// Title used when neither the product title nor the document title exist
pub const PLACEHOLDER_TITLE: &str = "Product from Amazon";

/// Sentinel title for pages the catalog reports as missing
pub const NOT_FOUND_TITLE: &str = "Product Not Found";

/// Sentinel title for pages that could not be processed
pub const ERROR_TITLE: &str = "Error Processing";

/// Returns true for the textual placeholders that mean "no value"
pub fn is_sentinel(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || value.eq_ignore_ascii_case(NOT_FOUND_TEXT)
        || value.eq_ignore_ascii_case(NOT_AVAILABLE_TEXT)
}

/// Product listing data extracted from a single product page.
///
/// Values are kept as page text; numeric coercion happens when the record
/// reaches the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub asin: String,
    pub title: String,
    pub price: String,
    pub rank: String,
    pub brand: String,
    pub ratings: String,
    pub stars: String,
    pub image_url: String,
    pub date: String,
    pub url: String,
}

impl ProductRecord {
    /// Whether the record carries a usable catalog identifier
    pub fn has_identifier(&self) -> bool {
        !is_sentinel(&self.asin)
    }

    /// Short title for log lines
    pub fn short_title(&self) -> String {
        self.title.chars().take(50).collect()
    }
}

/// Result of looking up a product by identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistingProduct {
    pub id: i64,
    pub rank: Option<i64>,
}

/// Row of the products table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProduct {
    pub id: i64,
    pub asin: String,
    pub name: String,
    pub price: Option<f64>,
    pub rank: Option<i64>,
    pub brand: Option<String>,
    pub ratings: Option<String>,
    pub stars: Option<String>,
    pub image_url: Option<String>,
    pub date: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// One observation in a product's rank trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankHistoryEntry {
    pub id: i64,
    pub asin: String,
    pub rank: i64,
    pub price: Option<f64>,
    #[serde(rename = "recordedAt")]
    pub recorded_at: DateTime<Utc>,
}
