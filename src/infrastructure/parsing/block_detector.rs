//! Page classification: normal content, missing product, or challenge page

use serde::{Deserialize, Serialize};

use super::locators::LocatorTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageClass {
    Normal,
    NotFound,
    Blocked,
}

/// Substring matcher over the locator table's phrase lists.
///
/// Matching is case-insensitive and treats typographic apostrophes as
/// straight ones. Not-found phrases are checked before block keywords.
#[derive(Debug, Clone)]
pub struct BlockDetector {
    captcha_keywords: Vec<String>,
    not_found_phrases: Vec<String>,
}

fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

impl BlockDetector {
    pub fn new(locators: &LocatorTable) -> Self {
        Self {
            captcha_keywords: locators.captcha_keywords.iter().map(|k| normalize(k)).collect(),
            not_found_phrases: locators.not_found_phrases.iter().map(|p| normalize(p)).collect(),
        }
    }

    pub fn classify(&self, page_text: &str) -> PageClass {
        let text = normalize(page_text);

        if self.not_found_phrases.iter().any(|p| text.contains(p.as_str())) {
            PageClass::NotFound
        } else if self.captcha_keywords.iter().any(|k| text.contains(k.as_str())) {
            PageClass::Blocked
        } else {
            PageClass::Normal
        }
    }

    pub fn is_blocked(&self, page_text: &str) -> bool {
        self.classify(page_text) == PageClass::Blocked
    }
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::new(&LocatorTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("<html><span id='productTitle'>Widget</span></html>", PageClass::Normal)]
    #[case("Sorry! We couldn't find that page. Try searching", PageClass::NotFound)]
    #[case("Sorry! We couldn\u{2019}t find that page.", PageClass::NotFound)]
    #[case("<title>Page Not Found</title>", PageClass::NotFound)]
    #[case("<form action='/errors/validateCaptcha'><input id='captchacharacters'>", PageClass::Blocked)]
    #[case("Enter the characters you see below", PageClass::Blocked)]
    #[case("We just need to make sure you\u{2019}re not a robot", PageClass::Blocked)]
    #[case("To discuss automated access to Amazon data please contact", PageClass::Blocked)]
    #[case("Click the button below to continue shopping", PageClass::Blocked)]
    fn test_classify(#[case] text: &str, #[case] expected: PageClass) {
        assert_eq!(BlockDetector::default().classify(text), expected);
    }

    #[test]
    fn test_not_found_wins_over_block_keywords() {
        let text = "Page not found. Continue shopping";
        assert_eq!(BlockDetector::default().classify(text), PageClass::NotFound);
    }

    #[test]
    fn test_custom_table() {
        let table = LocatorTable {
            captcha_keywords: vec!["Slow Down".to_string()],
            not_found_phrases: vec![],
            ..LocatorTable::default()
        };
        let detector = BlockDetector::new(&table);
        assert!(detector.is_blocked("please SLOW DOWN"));
        assert_eq!(detector.classify("page not found"), PageClass::Normal);
    }
}
