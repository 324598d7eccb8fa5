//! Infrastructure layer: configuration, logging, HTTP, parsing and storage
//!
//! Everything that touches the network or the filesystem lives here, behind
//! the traits declared in `domain::repositories`.

pub mod atomic_write;
pub mod booth_fetcher;
pub mod checkpoint_store;
pub mod config; // Configuration document and defaults
pub mod http_client;
pub mod logging;
pub mod parsing;
pub mod product_store;

// Re-export commonly used items
pub use booth_fetcher::BoothFetcher;
pub use checkpoint_store::JsonCheckpointStore;
pub use config::{AppConfig, ConfigError, ConfigManager};
pub use http_client::{HttpClient, HttpClientConfig};
pub use parsing::{ParsingError, ParsingResult, ProductDetailParser, SearchPageParser};
pub use product_store::{CorruptRecordPolicy, JsonProductStore};
