//! Repository and fetcher interfaces for the price crawler
//!
//! The orchestrator only ever talks to these traits; the JSON-file stores and
//! the BOOTH HTTP fetcher in `infrastructure` are one implementation of each.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use super::checkpoint::CrawlCheckpoint;
use super::price_history::PersistedProduct;
use super::product::{ProductId, ProductRecord};

/// Errors surfaced by a [`PageFetcher`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Could not parse {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl FetchError {
    /// Worth another attempt after a backoff
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Parse { .. } | Self::InvalidInput(_) => false,
        }
    }

    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn parse(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the durable stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize product {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unreadable record at {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Invalid product id {0:?}")]
    InvalidId(String),

    #[error("Background task failed: {0}")]
    Join(String),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Network access to the marketplace
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Product ids listed on one page of a search URL, in page order.
    ///
    /// `Ok(vec![])` means the page exists but lists nothing (end of category).
    /// A failed request is an `Err`, never an empty list.
    async fn fetch_search_ids(&self, search_url: &str, page: u32) -> Result<Vec<ProductId>, FetchError>;

    /// Current name, variations and sale signals of one product
    async fn fetch_product_details(&self, id: &str) -> Result<ProductRecord, FetchError>;
}

/// Durable per-product price history
#[async_trait]
pub trait ProductHistoryRepository: Send + Sync {
    /// `Ok(None)` when the product was never stored
    async fn load(&self, id: &str) -> Result<Option<PersistedProduct>, StoreError>;

    /// Replace the stored record; readers never observe a half-written file
    async fn save(&self, product: &PersistedProduct) -> Result<(), StoreError>;

    /// Every stored product id, sorted
    async fn list_ids(&self) -> Result<Vec<ProductId>, StoreError>;
}

/// Durable crawl cursor
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    /// Missing or unreadable state yields the default cursor
    async fn load(&self) -> CrawlCheckpoint;

    async fn save(&self, checkpoint: CrawlCheckpoint) -> Result<(), StoreError>;

    /// Forget the cursor so the next run starts from the beginning
    async fn clear(&self) -> Result<(), StoreError>;
}
