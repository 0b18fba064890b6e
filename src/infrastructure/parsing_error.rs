//! Parsing error types for product page extraction
//!
//! `ParsingError` covers faults of the parser itself (bad locator table,
//! unusable document). `FieldError` is the per-field outcome: a field is
//! either absent from the page or present but not in the expected shape.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Invalid CSS selector for {field}: {selector} - {reason}")]
    InvalidSelector {
        field: String,
        selector: String,
        reason: String,
    },

    #[error("Invalid locator table: {0}")]
    InvalidLocatorTable(String),

    #[error("HTML parsing failed: {message}")]
    HtmlParsingFailed { message: String, url: Option<String> },
}

impl ParsingError {
    pub fn invalid_selector(field: &str, selector: &str, reason: &str) -> Self {
        Self::InvalidSelector {
            field: field.to_string(),
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn html_parsing_failed(message: &str, url: Option<&str>) -> Self {
        Self::HtmlParsingFailed {
            message: message.to_string(),
            url: url.map(str::to_string),
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;

/// Why a single product field has no value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("field not present on page")]
    Missing,

    #[error("field present but malformed: {0}")]
    Malformed(String),
}

pub type FieldResult<T> = Result<T, FieldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ParsingError::invalid_selector("title", "##", "unexpected token");
        assert_eq!(err.to_string(), "Invalid CSS selector for title: ## - unexpected token");

        let field = FieldError::Malformed("no digits in 'many'".into());
        assert!(field.to_string().contains("malformed"));
        assert_ne!(field, FieldError::Missing);
    }
}
