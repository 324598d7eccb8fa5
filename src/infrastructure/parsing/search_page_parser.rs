//! Search result pages: product ids in listing order

use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;

use super::{ParsingResult, compile_selector};
use crate::domain::ProductId;
use crate::infrastructure::config::ParsingConfig;

pub struct SearchPageParser {
    item_selector: Selector,
    id_attribute: String,
}

impl SearchPageParser {
    pub fn new(config: &ParsingConfig) -> ParsingResult<Self> {
        Ok(Self {
            item_selector: compile_selector(&config.search_item_selector)?,
            id_attribute: config.search_id_attribute.clone(),
        })
    }

    /// Ids of every listed product, first occurrence wins. A page without
    /// item cards yields an empty list.
    pub fn parse(&self, html: &str) -> Vec<ProductId> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        for card in document.select(&self.item_selector) {
            let Some(raw) = card.value().attr(&self.id_attribute) else {
                continue;
            };
            let id = raw.trim();
            if !is_plausible_id(id) {
                debug!("Ignoring item card with id {:?}", raw);
                continue;
            }
            if seen.insert(id.to_string()) {
                ids.push(id.to_string());
            }
        }

        ids
    }
}

fn is_plausible_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// `base_url` with `page=<n>` added to its query
pub fn search_page_url(base_url: &str, page: u32) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(base_url)?;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("page", &page.to_string());
    Ok(url.into())
}
