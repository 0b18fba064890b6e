//! Locator table for product pages
//!
//! Everything the extractor and block detector know about the catalog's
//! markup lives here, so a layout change means a new table rather than a
//! code change. The default table describes the Amazon product page.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::ParsingError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorTable {
    pub title: String,
    pub price_primary: String,
    pub price_fallback: String,
    pub brand: String,
    pub ratings: String,
    pub stars: String,
    pub image_wrapper_img: String,
    pub og_image: String,
    pub landing_image: String,
    pub dynamic_image: String,
    pub detail_bullets_items: String,
    pub details_table_rows: String,

    /// Labels of the detail row holding the catalog identifier
    pub identifier_labels: Vec<String>,
    /// Detail-bullet marker preceding the sales rank
    pub rank_marker: String,
    /// Header labels of the first-available date row, most specific first
    pub date_labels: Vec<String>,

    /// Lowercase substrings that mark an anti-automation challenge page
    pub captcha_keywords: Vec<String>,
    /// Lowercase substrings that mark a missing product page
    pub not_found_phrases: Vec<String>,
}

impl Default for LocatorTable {
    fn default() -> Self {
        Self {
            title: "#productTitle".to_string(),
            price_primary: "span.a-price span.a-offscreen".to_string(),
            price_fallback: "span.a-price-whole".to_string(),
            brand: "#bylineInfo".to_string(),
            ratings: "#acrCustomerReviewText".to_string(),
            stars: "span.a-icon-alt".to_string(),
            image_wrapper_img: "#imgTagWrapperId img".to_string(),
            og_image: "meta[property='og:image'], meta[name='og:image']".to_string(),
            landing_image: "img#landingImage".to_string(),
            dynamic_image: "[data-a-dynamic-image]".to_string(),
            detail_bullets_items: "#detailBulletsWrapper_feature_div li".to_string(),
            details_table_rows: "#prodDetails table tr".to_string(),
            identifier_labels: vec!["ASIN".to_string()],
            rank_marker: "Best Sellers Rank".to_string(),
            date_labels: vec![
                "Date First Available".to_string(),
                "First Available".to_string(),
                "Date".to_string(),
            ],
            captcha_keywords: [
                "captchacharacters",
                "/captcha/",
                "enter the characters",
                "we just need to make sure you're not a robot",
                "not a robot",
                "automated access to amazon data",
                "type the characters",
                "sorry there was a problem with your request",
                "continue shopping",
                "click the button below to continue shopping",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            not_found_phrases: vec![
                "sorry! we couldn't find that page".to_string(),
                "page not found".to_string(),
            ],
        }
    }
}

impl LocatorTable {
    /// Parse a table from JSON; absent keys keep their default
    pub fn from_json_str(json: &str) -> Result<Self, ParsingError> {
        serde_json::from_str(json).map_err(|e| ParsingError::InvalidLocatorTable(e.to_string()))
    }

    /// Load a table from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read locator table {}", path.display()))?;
        Ok(Self::from_json_str(&json)?)
    }

    /// Load from `path` when given, otherwise the built-in table
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
