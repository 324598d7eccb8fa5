//! Application layer module
//!
//! Use cases that wire configuration into the crawl engine and the
//! maintenance jobs.

pub mod crawl_job;
pub mod sale_backfill;

pub use crawl_job::CrawlJob;
pub use sale_backfill::{BackfillReport, SaleBackfill};
