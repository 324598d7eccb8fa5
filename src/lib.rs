//! Booth Price Tracker - time-boxed marketplace crawler
//!
//! Walks BOOTH category search pages, fetches every listed product and folds
//! today's per-variation prices into a sharded JSON price history. Runs are
//! resumable and stop before the next scheduled run begins.

// Module declarations
pub mod application;
pub mod crawling;
pub mod domain;
pub mod infrastructure;

pub use application::{CrawlJob, SaleBackfill};
pub use crawling::{CrawlOrchestrator, CrawlOutcome, CrawlReport};
