//! Product page parser
//!
//! Turns a fetched product page into a [`ProductPage`] using the selectors
//! of a [`LocatorTable`]. Every field is an explicit [`FieldResult`]; the
//! textual defaults stored for absent fields are applied only when the page
//! is converted into a [`ProductRecord`].

#![allow(clippy::uninlined_format_args)]

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::block_detector::{BlockDetector, PageClass};
use super::error::{FieldError, FieldResult, ParsingError, ParsingResult};
use super::locators::LocatorTable;
use crate::domain::errors::CrawlError;
use crate::domain::product::{DEFAULT_BRAND, NOT_FOUND_TEXT, PLACEHOLDER_TITLE, ProductRecord};

/// Fields extracted from one product page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPage {
    pub url: String,
    pub asin: FieldResult<String>,
    pub title: FieldResult<String>,
    pub price: FieldResult<String>,
    pub rank: FieldResult<String>,
    pub brand: FieldResult<String>,
    pub ratings: FieldResult<String>,
    pub stars: FieldResult<String>,
    pub image_url: FieldResult<String>,
    pub date: FieldResult<String>,
}

impl ProductPage {
    pub fn has_image(&self) -> bool {
        self.image_url.is_ok()
    }

    /// Flatten into the stored representation, filling textual defaults
    pub fn into_record(self) -> ProductRecord {
        let or_not_found = |field: FieldResult<String>| field.unwrap_or_else(|_| NOT_FOUND_TEXT.to_string());

        ProductRecord {
            asin: or_not_found(self.asin),
            title: self.title.unwrap_or_else(|_| PLACEHOLDER_TITLE.to_string()),
            price: or_not_found(self.price),
            rank: or_not_found(self.rank),
            brand: self.brand.unwrap_or_else(|_| DEFAULT_BRAND.to_string()),
            ratings: or_not_found(self.ratings),
            stars: or_not_found(self.stars),
            image_url: or_not_found(self.image_url),
            date: or_not_found(self.date),
            url: self.url,
        }
    }
}

/// Collapse element text into single-spaced text, dropping directional marks
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .map(|word| word.trim_matches(|c| matches!(c, '\u{200e}' | '\u{200f}')))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Catalog identifier from a `/dp/<id>` or `/gp/product/<id>` URL path
pub fn identifier_from_url(source_url: &str) -> Option<String> {
    let url = Url::parse(source_url).ok()?;
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

    segments.iter().enumerate().find_map(|(i, segment)| {
        let candidate = match *segment {
            "dp" => segments.get(i + 1),
            "gp" if segments.get(i + 1) == Some(&"product") => segments.get(i + 2),
            _ => None,
        }?;
        Some(candidate.to_string())
    })
}

pub struct ProductPageParser {
    title: Selector,
    document_title: Selector,
    price_primary: Selector,
    price_fallback: Selector,
    brand: Selector,
    ratings: Selector,
    stars: Selector,
    image_wrapper_img: Selector,
    og_image: Selector,
    landing_image: Selector,
    dynamic_image: Selector,
    detail_bullets_items: Selector,
    details_table_rows: Selector,
    header_cell: Selector,
    data_cell: Selector,

    identifier_labels: Vec<String>,
    rank_marker: String,
    date_labels: Vec<String>,

    leading_number: Regex,
    stars_value: Regex,
    rank_value: Regex,

    detector: BlockDetector,
}

impl ProductPageParser {
    /// Compile every selector of the table up front
    pub fn new(locators: &LocatorTable) -> ParsingResult<Self> {
        let compile = |field: &str, selector: &str| {
            Selector::parse(selector)
                .map_err(|e| ParsingError::invalid_selector(field, selector, &e.to_string()))
        };
        let regex = |pattern: &str| {
            Regex::new(pattern).map_err(|e| ParsingError::InvalidLocatorTable(e.to_string()))
        };

        Ok(Self {
            title: compile("title", &locators.title)?,
            document_title: compile("document_title", "title")?,
            price_primary: compile("price_primary", &locators.price_primary)?,
            price_fallback: compile("price_fallback", &locators.price_fallback)?,
            brand: compile("brand", &locators.brand)?,
            ratings: compile("ratings", &locators.ratings)?,
            stars: compile("stars", &locators.stars)?,
            image_wrapper_img: compile("image_wrapper_img", &locators.image_wrapper_img)?,
            og_image: compile("og_image", &locators.og_image)?,
            landing_image: compile("landing_image", &locators.landing_image)?,
            dynamic_image: compile("dynamic_image", &locators.dynamic_image)?,
            detail_bullets_items: compile("detail_bullets_items", &locators.detail_bullets_items)?,
            details_table_rows: compile("details_table_rows", &locators.details_table_rows)?,
            header_cell: compile("header_cell", "th")?,
            data_cell: compile("data_cell", "td")?,

            identifier_labels: locators.identifier_labels.clone(),
            rank_marker: locators.rank_marker.clone(),
            date_labels: locators.date_labels.clone(),

            leading_number: regex(r"([\d,]+)")?,
            stars_value: regex(r"([0-9.]+)\s+out of 5")?,
            rank_value: regex(r"#([\d,]+)")?,

            detector: BlockDetector::new(locators),
        })
    }

    pub fn detector(&self) -> &BlockDetector {
        &self.detector
    }

    /// Parse a product page.
    ///
    /// A not-found page short-circuits before any field is read. Challenge
    /// pages are the fetcher's concern and are parsed like any other page.
    pub fn parse(&self, page: &str, source_url: &str) -> Result<ProductPage, CrawlError> {
        if page.trim().is_empty() {
            return Err(CrawlError::Extraction(
                ParsingError::html_parsing_failed("empty document", Some(source_url)).to_string(),
            ));
        }
        if self.detector.classify(page) == PageClass::NotFound {
            debug!("Not-found page for {}", source_url);
            return Err(CrawlError::NotFound { url: source_url.to_string() });
        }

        let html = Html::parse_document(page);
        let product = ProductPage {
            url: source_url.to_string(),
            asin: self.extract_identifier(&html, source_url),
            title: self.extract_title(&html),
            price: self.extract_price(&html),
            rank: self.extract_rank(&html),
            brand: self.first_text(&html, &self.brand),
            ratings: self.extract_ratings(&html),
            stars: self.extract_stars(&html),
            image_url: self.extract_image(&html),
            date: self.extract_date(&html),
        };

        debug!(
            "Parsed {}: asin={:?} rank={:?} image={}",
            source_url,
            product.asin,
            product.rank,
            product.has_image()
        );
        Ok(product)
    }

    /// Trimmed text of the first matching element with non-empty text
    fn first_text(&self, html: &Html, selector: &Selector) -> FieldResult<String> {
        html.select(selector)
            .map(|element| element_text(&element))
            .find(|text| !text.is_empty())
            .ok_or(FieldError::Missing)
    }

    fn first_attr(&self, html: &Html, selector: &Selector, attr: &str) -> Option<String> {
        html.select(selector)
            .filter_map(|element| element.value().attr(attr))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn extract_identifier(&self, html: &Html, source_url: &str) -> FieldResult<String> {
        let matches_label = |label: &str| {
            self.identifier_labels
                .iter()
                .any(|wanted| label.trim().eq_ignore_ascii_case(wanted))
        };

        let from_table = html.select(&self.details_table_rows).find_map(|row| {
            let header = row.select(&self.header_cell).next().map(|th| element_text(&th))?;
            let value = row.select(&self.data_cell).next().map(|td| element_text(&td))?;
            (matches_label(&header) && !value.is_empty()).then_some(value)
        });

        let from_bullets = || {
            html.select(&self.detail_bullets_items).find_map(|item| {
                let text = element_text(&item);
                let (label, value) = text.split_once(':')?;
                let value = value.trim();
                (matches_label(label) && !value.is_empty()).then(|| value.to_string())
            })
        };

        from_table
            .or_else(from_bullets)
            .or_else(|| identifier_from_url(source_url))
            .ok_or(FieldError::Missing)
    }

    fn extract_title(&self, html: &Html) -> FieldResult<String> {
        self.first_text(html, &self.title)
            .or_else(|_| self.first_text(html, &self.document_title))
    }

    fn extract_price(&self, html: &Html) -> FieldResult<String> {
        let raw = self
            .first_text(html, &self.price_primary)
            .or_else(|_| self.first_text(html, &self.price_fallback))?;

        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let cleaned = cleaned.trim_end_matches('.').to_string();

        if cleaned.is_empty() {
            Err(FieldError::Malformed(format!("no amount in price '{}'", raw)))
        } else {
            Ok(cleaned)
        }
    }

    fn extract_ratings(&self, html: &Html) -> FieldResult<String> {
        let text = self.first_text(html, &self.ratings)?;
        self.leading_number
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().replace(',', ""))
            .filter(|count| !count.is_empty())
            .ok_or_else(|| FieldError::Malformed(format!("no count in '{}'", text)))
    }

    fn extract_stars(&self, html: &Html) -> FieldResult<String> {
        let texts: Vec<String> = html.select(&self.stars).map(|e| element_text(&e)).collect();
        if texts.is_empty() {
            return Err(FieldError::Missing);
        }

        texts
            .iter()
            .find_map(|text| {
                self.stars_value
                    .captures(text)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .ok_or_else(|| FieldError::Malformed(format!("no star rating in '{}'", texts[0])))
    }

    /// Wrapper image, then og:image, then the landing image, then the
    /// largest entry of the dynamic image map
    fn extract_image(&self, html: &Html) -> FieldResult<String> {
        self.first_attr(html, &self.image_wrapper_img, "src")
            .or_else(|| self.first_attr(html, &self.og_image, "content"))
            .or_else(|| self.first_attr(html, &self.landing_image, "src"))
            .or_else(|| {
                html.select(&self.dynamic_image)
                    .filter_map(|e| e.value().attr("data-a-dynamic-image"))
                    .find_map(largest_dynamic_image)
            })
            .ok_or(FieldError::Missing)
    }

    fn extract_rank(&self, html: &Html) -> FieldResult<String> {
        let rank_texts: Vec<String> = html
            .select(&self.detail_bullets_items)
            .chain(html.select(&self.details_table_rows))
            .map(|e| element_text(&e))
            .filter(|text| text.contains(self.rank_marker.as_str()))
            .collect();

        if rank_texts.is_empty() {
            return Err(FieldError::Missing);
        }

        rank_texts
            .iter()
            .find_map(|text| {
                self.rank_value
                    .captures(text)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().replace(',', ""))
                    .filter(|rank| !rank.is_empty())
            })
            .ok_or_else(|| FieldError::Malformed(format!("no rank number in '{}'", rank_texts[0])))
    }

    fn extract_date(&self, html: &Html) -> FieldResult<String> {
        let has_label = |text: &str| self.date_labels.iter().any(|label| text.contains(label.as_str()));

        let from_table = html.select(&self.details_table_rows).find_map(|row| {
            let header = row.select(&self.header_cell).next().map(|th| element_text(&th))?;
            let value = row.select(&self.data_cell).next().map(|td| element_text(&td))?;
            has_label(&header).then_some(value)
        });

        let from_bullets = || {
            html.select(&self.detail_bullets_items).find_map(|item| {
                let text = element_text(&item);
                if !has_label(&text) {
                    return None;
                }
                text.split_once(':').map(|(_, value)| value.trim().to_string())
            })
        };

        from_table
            .or_else(from_bullets)
            .filter(|date| !date.is_empty())
            .ok_or(FieldError::Missing)
    }
}

/// Pick the URL with the largest width×height from a
/// `{"url": [width, height], ...}` attribute value
fn largest_dynamic_image(raw: &str) -> Option<String> {
    let decoded = raw.replace("&quot;", "\"");
    let images: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&decoded).ok()?;

    images
        .iter()
        .map(|(url, size)| {
            let dimension = |i: usize| size.get(i).and_then(serde_json::Value::as_u64).unwrap_or(0);
            (url, dimension(0).saturating_mul(dimension(1)))
        })
        .max_by_key(|(_, area)| *area)
        .map(|(url, _)| url.clone())
}
