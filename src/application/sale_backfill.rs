//! Maintenance pass re-applying the price-drop sale heuristic
//!
//! History written before the heuristic existed has drops that were never
//! flagged. This walks every stored product once; only files that actually
//! change are rewritten.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{ProductHistoryRepository, StoreError, reinfer_price_drop_sales};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub scanned: usize,
    /// Files rewritten (or that would be, in a dry run)
    pub updated: usize,
    pub flipped_observations: usize,
    pub unreadable: usize,
    pub write_failures: usize,
}

pub struct SaleBackfill {
    store: Arc<dyn ProductHistoryRepository>,
    dry_run: bool,
}

impl SaleBackfill {
    pub fn new(store: Arc<dyn ProductHistoryRepository>) -> Self {
        Self { store, dry_run: false }
    }

    /// Count what would change without writing anything
    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Fails only when the store cannot be listed
    pub async fn run(&self) -> Result<BackfillReport, StoreError> {
        let ids = self.store.list_ids().await?;
        info!("Sale backfill over {} products (dry run: {})", ids.len(), self.dry_run);

        let mut report = BackfillReport::default();
        for id in ids {
            report.scanned += 1;
            let mut product = match self.store.load(&id).await {
                Ok(Some(product)) => product,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping unreadable product {}: {}", id, e);
                    report.unreadable += 1;
                    continue;
                }
            };

            let flipped = reinfer_price_drop_sales(&mut product);
            if flipped == 0 {
                continue;
            }
            report.flipped_observations += flipped;

            if self.dry_run {
                debug!("Would mark {} observations of {} as sale", flipped, id);
                report.updated += 1;
                continue;
            }
            match self.store.save(&product).await {
                Ok(()) => {
                    debug!("Marked {} observations of {} as sale", flipped, id);
                    report.updated += 1;
                }
                Err(e) => {
                    warn!("Failed to rewrite product {}: {}", id, e);
                    report.write_failures += 1;
                }
            }
        }

        info!(
            "Sale backfill done: scanned {}, updated {}, flipped {}, unreadable {}",
            report.scanned, report.updated, report.flipped_observations, report.unreadable
        );
        Ok(report)
    }
}
