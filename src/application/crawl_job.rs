//! One scheduled, time-boxed crawl run

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};

use crate::crawling::{ConcurrencyBatcher, CrawlOrchestrator, CrawlReport, RunSchedule, RunScope};
use crate::infrastructure::{
    AppConfig, BoothFetcher, HttpClient, HttpClientConfig, JsonCheckpointStore, JsonProductStore,
};

pub struct CrawlJob {
    config: AppConfig,
    schedule: RunSchedule,
}

impl CrawlJob {
    pub fn new(config: AppConfig) -> Result<Self> {
        let schedule = config
            .schedule
            .to_run_schedule()
            .context("Invalid schedule configuration")?;
        Ok(Self { config, schedule })
    }

    pub const fn schedule(&self) -> &RunSchedule {
        &self.schedule
    }

    /// When a run started at `now` has to stop
    pub fn stop_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.schedule.stop_time(now)
    }

    /// Scope for a run starting at `now`
    pub fn scope_at(&self, now: DateTime<Utc>, shutdown: CancellationToken) -> RunScope {
        RunScope::new(self.schedule.today(now), self.stop_time(now)).with_shutdown(shutdown)
    }

    /// Orchestrator wired to BOOTH and the JSON stores under `storage.data_dir`
    pub fn build_orchestrator(&self) -> Result<CrawlOrchestrator> {
        let http = HttpClient::new(HttpClientConfig::from(&self.config.http))?;
        let fetcher = BoothFetcher::new(Arc::new(http), &self.config.parsing)
            .context("Invalid parsing configuration")?;

        let storage = &self.config.storage;
        let history = JsonProductStore::new(&storage.data_dir, storage.corrupt_record_policy);
        let checkpoints = JsonCheckpointStore::in_data_dir(&storage.data_dir);

        Ok(CrawlOrchestrator::new(
            Arc::new(fetcher),
            Arc::new(history),
            Arc::new(checkpoints),
            ConcurrencyBatcher::new(self.config.batch.batch_size, self.config.batch.batch_delay()),
            self.config.crawl.to_plan(),
        ))
    }

    /// Run until done, the deadline, or `shutdown`
    pub async fn run(&self, shutdown: CancellationToken) -> Result<CrawlReport> {
        let orchestrator = self.build_orchestrator()?;
        let scope = self.scope_at(Utc::now(), shutdown);

        let span = info_span!("crawl", run_id = %scope.run_id());
        async {
            info!(
                "Crawl run for {} (stop at {}, data dir {:?})",
                scope.today(),
                scope.deadline(),
                self.config.storage.data_dir
            );
            Ok(orchestrator.run(&scope).await)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn scope_uses_schedule_deadline_and_date() {
        let job = CrawlJob::new(AppConfig::default()).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 14, 0, 0).unwrap();
        let scope = job.scope_at(now, CancellationToken::new());
        assert_eq!(scope.deadline(), Utc.with_ymd_and_hms(2026, 3, 14, 17, 30, 0).unwrap());
        assert_eq!(scope.today(), now.date_naive());
    }

    #[test]
    fn orchestrator_builds_from_defaults() {
        let job = CrawlJob::new(AppConfig::default()).unwrap();
        let orchestrator = job.build_orchestrator().unwrap();
        assert_eq!(orchestrator.plan().search_urls.len(), 2);
    }
}
