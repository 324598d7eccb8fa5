//! # Crawl control
//!
//! Everything that decides *when* and *how much* to crawl:
//! - `deadline`: stop-time computation from the run schedule
//! - `batcher`: bounded-parallel processing in fixed-size groups
//! - `run_scope`: per-run state (seen-set, deadline, shutdown signal)
//! - `orchestrator`: the resumable page loop tying it all together

pub mod batcher;
pub mod deadline;
pub mod orchestrator;
pub mod run_scope;

pub use batcher::ConcurrencyBatcher;
pub use deadline::{RunSchedule, compute_stop_time, next_scheduled_run};
pub use orchestrator::{
    CrawlOrchestrator, CrawlOutcome, CrawlPlan, CrawlReport, CrawlStats, SearchFailurePolicy,
};
pub use run_scope::{Clock, RunScope, StopReason, SystemClock};
