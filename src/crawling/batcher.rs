//! Bounded-parallel processing in fixed-size groups
//!
//! Items are split into consecutive groups; a group runs concurrently and is
//! awaited as a whole before the pacing delay and the next group. The job
//! returns an outcome value, so one failing item never aborts its siblings.

use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ConcurrencyBatcher {
    batch_size: usize,
    batch_delay: Duration,
}

impl ConcurrencyBatcher {
    /// A batch size of zero is treated as one
    pub fn new(batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub const fn batch_delay(&self) -> Duration {
        self.batch_delay
    }

    /// Run `job` for every item, at most `batch_size` at a time, sleeping
    /// `batch_delay` between groups. Outcomes come back grouped by batch;
    /// order within a group follows the input.
    pub async fn run<I, T, F, Fut>(&self, items: &[I], mut job: F) -> Vec<T>
    where
        I: Clone,
        F: FnMut(I) -> Fut,
        Fut: Future<Output = T>,
    {
        let total_batches = items.len().div_ceil(self.batch_size);
        let mut outcomes = Vec::with_capacity(items.len());

        for (batch_idx, batch) in items.chunks(self.batch_size).enumerate() {
            if batch_idx > 0 && !self.batch_delay.is_zero() {
                sleep(self.batch_delay).await;
            }

            let batch_tasks: Vec<Fut> = batch.iter().cloned().map(&mut job).collect();
            outcomes.extend(join_all(batch_tasks).await);
            debug!("Batch {}/{} finished ({} items)", batch_idx + 1, total_batches, batch.len());
        }

        outcomes
    }
}
