//! [`PageFetcher`] backed by the BOOTH website

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{FetchError, PageFetcher, ProductId, ProductRecord};
use crate::infrastructure::config::ParsingConfig;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::parsing::{ParsingResult, ProductDetailParser, SearchPageParser};
use crate::infrastructure::parsing::search_page_parser::search_page_url;

pub struct BoothFetcher {
    http: Arc<HttpClient>,
    search_parser: SearchPageParser,
    detail_parser: ProductDetailParser,
    detail_base_url: String,
}

impl BoothFetcher {
    pub fn new(http: Arc<HttpClient>, config: &ParsingConfig) -> ParsingResult<Self> {
        Ok(Self {
            http,
            search_parser: SearchPageParser::new(config)?,
            detail_parser: ProductDetailParser::new(config)?,
            detail_base_url: config.detail_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn detail_url(&self, id: &str) -> String {
        format!("{}/{}", self.detail_base_url, id)
    }
}

#[async_trait]
impl PageFetcher for BoothFetcher {
    async fn fetch_search_ids(&self, search_url: &str, page: u32) -> Result<Vec<ProductId>, FetchError> {
        let url = search_page_url(search_url, page)
            .map_err(|e| FetchError::InvalidInput(format!("search URL {search_url}: {e}")))?;
        let html = self.http.get_text(&url).await?;
        let ids = self.search_parser.parse(&html);
        debug!("{} -> {} ids", url, ids.len());
        Ok(ids)
    }

    async fn fetch_product_details(&self, id: &str) -> Result<ProductRecord, FetchError> {
        let url = self.detail_url(id);
        let html = self.http.get_text(&url).await?;
        self.detail_parser
            .parse(id, &html)
            .map_err(|e| FetchError::parse(url, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::HttpClientConfig;

    #[test]
    fn detail_url_joins_base_and_id() {
        let http = Arc::new(HttpClient::new(HttpClientConfig::default()).unwrap());
        let config = ParsingConfig {
            detail_base_url: "https://booth.pm/ja/items/".into(),
            ..ParsingConfig::default()
        };
        let fetcher = BoothFetcher::new(http, &config).unwrap();
        assert_eq!(fetcher.detail_url("4120631"), "https://booth.pm/ja/items/4120631");
    }
}
