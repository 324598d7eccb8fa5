use serde::{Deserialize, Serialize};

/// Durable crawl cursor: resume at this search URL and this page.
///
/// Serialized with the same key names the first crawler generation used, so an
/// existing `crawl_state.json` keeps working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlCheckpoint {
    pub search_url_index: usize,
    pub page: u32,
}

impl Default for CrawlCheckpoint {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

impl CrawlCheckpoint {
    pub const fn new(search_url_index: usize, page: u32) -> Self {
        Self { search_url_index, page }
    }

    /// Pages are 1-based; anything else came from a damaged file
    pub const fn is_valid(&self) -> bool {
        self.page >= 1
    }

    /// Cursor for the page after this one
    #[must_use]
    pub const fn next_page(self) -> Self {
        Self::new(self.search_url_index, self.page + 1)
    }

    /// Cursor for the first page of the following search URL
    #[must_use]
    pub const fn next_search_url(self) -> Self {
        Self::new(self.search_url_index + 1, 1)
    }
}
