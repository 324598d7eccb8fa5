//! Domain module - Core business logic and entities
//!
//! This module contains the price-tracking entities, the merge rules that
//! fold a fresh observation into stored history, and the repository seams
//! the crawler talks to.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod checkpoint;
pub mod history_merger;
pub mod price_history;
pub mod product;
pub mod repositories;

pub use checkpoint::CrawlCheckpoint;
pub use history_merger::{merge, reinfer_price_drop_sales};
pub use price_history::{
    DEFAULT_VARIATION_NAME, DailyObservation, PersistedProduct, StoredDocument,
};
pub use product::{ProductId, ProductRecord, VariationPrice};
pub use repositories::{
    CheckpointRepository, FetchError, PageFetcher, ProductHistoryRepository, StoreError,
};
