//! # Crawl Orchestrator
//!
//! Resumable page loop over `(search URL index, page)`. The checkpoint is
//! written after every page boundary so a killed process resumes where it
//! left off; per-product failures are logged and left for the next run.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::batcher::ConcurrencyBatcher;
use super::run_scope::{Clock, RunScope, StopReason, SystemClock};
use crate::domain::{
    CheckpointRepository, CrawlCheckpoint, PageFetcher, ProductHistoryRepository, ProductId, merge,
};

/// BOOTH refuses to paginate a search past this page
pub const DEFAULT_MAX_PAGES_PER_SEARCH: u32 = 3333;
pub const DEFAULT_PAGE_DELAY_MS: u64 = 1500;

/// What to do when a search page cannot be fetched at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchFailurePolicy {
    /// Log it and treat the category as exhausted
    #[default]
    AdvanceCategory,
    /// Keep the checkpoint on the failing page and end the run
    StopRun,
}

/// Static inputs of a crawl
#[derive(Debug, Clone)]
pub struct CrawlPlan {
    pub search_urls: Vec<String>,
    pub max_pages_per_search: u32,
    /// Pause after each processed page
    pub page_delay: Duration,
    pub search_failure_policy: SearchFailurePolicy,
}

impl CrawlPlan {
    pub fn new(search_urls: Vec<String>) -> Self {
        Self {
            search_urls,
            max_pages_per_search: DEFAULT_MAX_PAGES_PER_SEARCH,
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
            search_failure_policy: SearchFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlOutcome {
    /// Every search URL was exhausted; the checkpoint has been cleared
    Completed,
    DeadlineReached,
    /// Shutdown signal received
    Interrupted,
    StoppedOnSearchFailure,
}

impl From<StopReason> for CrawlOutcome {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Deadline => Self::DeadlineReached,
            StopReason::Shutdown => Self::Interrupted,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub pages_processed: u32,
    pub ids_listed: usize,
    pub products_saved: usize,
    pub fetch_failures: usize,
    pub store_failures: usize,
    pub skipped_duplicates: usize,
    pub search_failures: usize,
}

impl CrawlStats {
    fn record(&mut self, outcome: ProductOutcome) {
        match outcome {
            ProductOutcome::Saved => self.products_saved += 1,
            ProductOutcome::AlreadyClaimed => self.skipped_duplicates += 1,
            ProductOutcome::FetchFailed => self.fetch_failures += 1,
            ProductOutcome::StoreFailed => self.store_failures += 1,
        }
    }
}

/// Summary of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub run_id: Uuid,
    pub outcome: CrawlOutcome,
    pub stats: CrawlStats,
    /// Where the next run picks up; `None` after a completed crawl
    pub resume_from: Option<CrawlCheckpoint>,
    pub elapsed: Duration,
}

/// Result of processing one listed id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProductOutcome {
    Saved,
    AlreadyClaimed,
    FetchFailed,
    StoreFailed,
}

pub struct CrawlOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    history: Arc<dyn ProductHistoryRepository>,
    checkpoints: Arc<dyn CheckpointRepository>,
    batcher: ConcurrencyBatcher,
    plan: CrawlPlan,
    clock: Arc<dyn Clock>,
}

impl CrawlOrchestrator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        history: Arc<dyn ProductHistoryRepository>,
        checkpoints: Arc<dyn CheckpointRepository>,
        batcher: ConcurrencyBatcher,
        plan: CrawlPlan,
    ) -> Self {
        Self {
            fetcher,
            history,
            checkpoints,
            batcher,
            plan,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub const fn plan(&self) -> &CrawlPlan {
        &self.plan
    }

    /// Drive the crawl until every search URL is exhausted, the deadline
    /// passes, shutdown is requested, or a search page fails under
    /// [`SearchFailurePolicy::StopRun`]. Never fails; problems end up in the
    /// report and the log.
    pub async fn run(&self, scope: &RunScope) -> CrawlReport {
        let started = Instant::now();
        let mut stats = CrawlStats::default();

        let mut cursor = self.checkpoints.load().await;
        if !cursor.is_valid() {
            warn!("Ignoring invalid checkpoint {:?}, starting over", cursor);
            cursor = CrawlCheckpoint::default();
        }
        info!(
            "Starting crawl at search URL {}/{} page {} (deadline {})",
            cursor.search_url_index + 1,
            self.plan.search_urls.len(),
            cursor.page,
            scope.deadline()
        );

        let outcome = loop {
            if cursor.search_url_index >= self.plan.search_urls.len() {
                break CrawlOutcome::Completed;
            }

            if let Some(reason) = scope.stop_reason(self.clock.now()) {
                info!("Stopping before page {} of search URL {}: {:?}", cursor.page, cursor.search_url_index, reason);
                self.persist_checkpoint(cursor).await;
                break reason.into();
            }

            if cursor.page > self.plan.max_pages_per_search {
                info!(
                    "Search URL {} reached the {}-page cap, moving on",
                    cursor.search_url_index, self.plan.max_pages_per_search
                );
                cursor = cursor.next_search_url();
                self.persist_checkpoint(cursor).await;
                continue;
            }

            let search_url = &self.plan.search_urls[cursor.search_url_index];
            match self.fetcher.fetch_search_ids(search_url, cursor.page).await {
                Ok(ids) if ids.is_empty() => {
                    info!("Search URL {} exhausted at page {}", cursor.search_url_index, cursor.page);
                    cursor = cursor.next_search_url();
                    self.persist_checkpoint(cursor).await;
                }
                Ok(ids) => {
                    debug!("Page {} of {} lists {} products", cursor.page, search_url, ids.len());
                    stats.pages_processed += 1;
                    stats.ids_listed += ids.len();

                    let outcomes = self
                        .batcher
                        .run(&ids, move |id| self.process_product(scope, id))
                        .await;
                    for outcome in outcomes {
                        stats.record(outcome);
                    }

                    cursor = cursor.next_page();
                    self.persist_checkpoint(cursor).await;
                    self.pause_between_pages(scope).await;
                }
                Err(err) => {
                    stats.search_failures += 1;
                    match self.plan.search_failure_policy {
                        SearchFailurePolicy::AdvanceCategory => {
                            warn!("Search page failed, skipping rest of search URL {}: {}", cursor.search_url_index, err);
                            cursor = cursor.next_search_url();
                            self.persist_checkpoint(cursor).await;
                        }
                        SearchFailurePolicy::StopRun => {
                            error!("Search page failed, stopping run at page {}: {}", cursor.page, err);
                            self.persist_checkpoint(cursor).await;
                            break CrawlOutcome::StoppedOnSearchFailure;
                        }
                    }
                }
            }
        };

        let resume_from = if outcome == CrawlOutcome::Completed {
            if let Err(e) = self.checkpoints.clear().await {
                error!("Failed to clear checkpoint after completed crawl: {}", e);
            }
            None
        } else {
            Some(cursor)
        };

        let report = CrawlReport {
            run_id: scope.run_id(),
            outcome,
            stats,
            resume_from,
            elapsed: started.elapsed(),
        };
        info!(
            "Crawl finished: {:?} in {:?} (pages: {}, saved: {}, fetch failures: {}, store failures: {}, duplicates: {})",
            report.outcome,
            report.elapsed,
            report.stats.pages_processed,
            report.stats.products_saved,
            report.stats.fetch_failures,
            report.stats.store_failures,
            report.stats.skipped_duplicates
        );
        report
    }

    async fn process_product(&self, scope: &RunScope, id: ProductId) -> ProductOutcome {
        if !scope.claim(&id).await {
            debug!("Product {} already handled this run", id);
            return ProductOutcome::AlreadyClaimed;
        }

        let mut record = match self.fetcher.fetch_product_details(&id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to fetch product {}: {}", id, e);
                return ProductOutcome::FetchFailed;
            }
        };
        // History is keyed by the listed id
        if record.id != id {
            warn!("Details for {} came back as {}, storing under {}", id, record.id, id);
            record.id.clone_from(&id);
        }

        let existing = match self.history.load(&id).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!("Skipping product {}: {}", id, e);
                return ProductOutcome::StoreFailed;
            }
        };

        let merged = merge(existing, &record, scope.today());
        match self.history.save(&merged).await {
            Ok(()) => ProductOutcome::Saved,
            Err(e) => {
                warn!("Failed to save product {}: {}", id, e);
                ProductOutcome::StoreFailed
            }
        }
    }

    async fn persist_checkpoint(&self, checkpoint: CrawlCheckpoint) {
        if let Err(e) = self.checkpoints.save(checkpoint).await {
            error!("Failed to save checkpoint {:?}: {}", checkpoint, e);
        }
    }

    async fn pause_between_pages(&self, scope: &RunScope) {
        if self.plan.page_delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = sleep(self.plan.page_delay) => {}
            _ = scope.shutdown_requested() => {}
        }
    }
}
