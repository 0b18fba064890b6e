//! HTML parsing infrastructure for product pages
//!
//! The locator table describes the catalog markup, the block detector
//! classifies fetched pages, and the product page parser extracts fields.

pub mod block_detector;
pub mod error;
pub mod locators;
pub mod product_page_parser;

// Re-export public types
pub use block_detector::{BlockDetector, PageClass};
pub use error::{FieldError, FieldResult, ParsingError, ParsingResult};
pub use locators::LocatorTable;
pub use product_page_parser::{ProductPage, ProductPageParser, identifier_from_url};
