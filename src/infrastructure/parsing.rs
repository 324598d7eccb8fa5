//! HTML parsing for BOOTH pages
//!
//! Selectors come from configuration and are compiled once per parser.

pub mod error;
pub mod product_detail_parser;
pub mod search_page_parser;

pub use error::{ParsingError, ParsingResult};
pub use product_detail_parser::ProductDetailParser;
pub use search_page_parser::SearchPageParser;

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Selector};

lazy_static! {
    static ref NON_DIGITS: Regex = Regex::new(r"[^0-9]").expect("static regex");
}

/// Compile a configured selector
pub(crate) fn compile_selector(selector: &str) -> ParsingResult<Selector> {
    Selector::parse(selector).map_err(|e| ParsingError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Whitespace-normalized text content of an element
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// "¥ 1,500~" -> 1500. `None` when no ASCII digit is present.
pub fn parse_price(text: &str) -> Option<u64> {
    let digits = NON_DIGITS.replace_all(text, "");
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
