//! Per-run state shared by every concurrent fetch of one crawl
//!
//! Holds the seen-set, the deadline and the shutdown signal. One `RunScope`
//! per run, passed explicitly; nothing here outlives the run.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::ProductId;

/// Source of "now" for deadline checks
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Why the page loop has to stop early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Deadline,
    Shutdown,
}

#[derive(Debug)]
pub struct RunScope {
    run_id: Uuid,
    today: NaiveDate,
    deadline: DateTime<Utc>,
    seen: Mutex<HashSet<ProductId>>,
    shutdown: CancellationToken,
}

impl RunScope {
    pub fn new(today: NaiveDate, deadline: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            today,
            deadline,
            seen: Mutex::new(HashSet::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop at the next page boundary once `token` is cancelled
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub const fn today(&self) -> NaiveDate {
        self.today
    }

    pub const fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Claim `id` for this run. `false` if it was already claimed.
    pub async fn claim(&self, id: &str) -> bool {
        self.seen.lock().await.insert(id.to_string())
    }

    pub async fn claimed_count(&self) -> usize {
        self.seen.lock().await.len()
    }

    /// Shutdown takes precedence over the deadline
    pub fn stop_reason(&self, now: DateTime<Utc>) -> Option<StopReason> {
        if self.shutdown.is_cancelled() {
            Some(StopReason::Shutdown)
        } else if now > self.deadline {
            Some(StopReason::Deadline)
        } else {
            None
        }
    }

    /// Resolves once shutdown was requested
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scope() -> RunScope {
        RunScope::new(
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 14, 17, 30, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn ids_are_claimed_once() {
        let scope = scope();
        assert!(scope.claim("4120631").await);
        assert!(!scope.claim("4120631").await);
        assert!(scope.claim("4120632").await);
        assert_eq!(scope.claimed_count().await, 2);
    }

    #[test]
    fn deadline_is_exclusive() {
        let scope = scope();
        assert_eq!(scope.stop_reason(scope.deadline()), None);
        assert_eq!(
            scope.stop_reason(scope.deadline() + chrono::TimeDelta::seconds(1)),
            Some(StopReason::Deadline)
        );
    }

    #[test]
    fn shutdown_wins_over_deadline() {
        let token = CancellationToken::new();
        let scope = scope().with_shutdown(token.clone());
        token.cancel();
        assert_eq!(
            scope.stop_reason(Utc.with_ymd_and_hms(2026, 3, 14, 23, 0, 0).unwrap()),
            Some(StopReason::Shutdown)
        );
    }

    #[test]
    fn shutdown_future_wakes_on_cancel() {
        let token = CancellationToken::new();
        let scope = scope().with_shutdown(token.clone());
        let mut waiting = tokio_test::task::spawn(scope.shutdown_requested());

        tokio_test::assert_pending!(waiting.poll());
        token.cancel();
        assert!(waiting.is_woken());
        tokio_test::assert_ready!(waiting.poll());
    }
}
