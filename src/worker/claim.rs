//! Optimistic claims over the shared backlog
//!
//! Claims are leases, not locks: a conditional single-row update wins or
//! loses against racing workers, and an expired lease is claimable again so
//! a crashed worker cannot strand a page forever.

use crate::db::models::Page;
use crate::db::{datasheets, pages, DbPool};
use crate::error::Result;
use crate::worker::config::WorkerConfig;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one candidate-selection pass
#[derive(Debug)]
pub struct ClaimOutcome {
    /// Pages this worker now holds
    pub claimed: Vec<Page>,
    /// Candidates lost to another worker's claim
    pub skipped: usize,
}

/// Acquires and releases page claims for one worker
pub struct ClaimManager {
    pool: DbPool,
    worker_id: String,
    oversample_factor: usize,
    subcategory: Option<String>,
    datasheet_count: Option<i64>,
    lease_duration: Duration,
}

impl ClaimManager {
    pub fn new(pool: DbPool, config: &WorkerConfig) -> Self {
        Self {
            pool,
            worker_id: config.worker_id.clone(),
            oversample_factor: config.oversample_factor.max(1),
            subcategory: config.subcategory.clone(),
            datasheet_count: config.datasheet_count,
            lease_duration: config.lease_duration,
        }
    }

    /// Attempt to claim one page; false means another worker holds it
    pub async fn claim(&self, page_id: i64) -> Result<bool> {
        pages::try_claim(&self.pool, page_id, &self.worker_id, self.lease_deadline()).await
    }

    /// Release a claim; safe to call on pages this worker never held
    pub async fn release(&self, page_id: i64) -> Result<()> {
        pages::release(&self.pool, page_id).await
    }

    /// Select and claim up to `limit` pages
    ///
    /// Reads an oversampled batch, shuffles it to spread racing workers
    /// across the scan, applies the datasheet-count filter, then claims
    /// greedily. Returning fewer than `limit` pages just means the backlog
    /// ran short.
    pub async fn select_candidates(&self, limit: usize) -> Result<ClaimOutcome> {
        let sample_size = (limit * self.oversample_factor) as i64;
        let mut candidates =
            pages::fetch_unprocessed(&self.pool, self.subcategory.as_deref(), sample_size).await?;
        debug!(
            "[{}] Fetched {} candidates for batch of {}",
            self.worker_id,
            candidates.len(),
            limit
        );

        candidates.shuffle(&mut rand::thread_rng());

        let mut claimed: Vec<Page> = Vec::with_capacity(limit);
        let mut skipped = 0;
        let mut failure = None;

        for page in candidates {
            if claimed.len() >= limit {
                break;
            }

            if let Some(want) = self.datasheet_count {
                match datasheets::count_for_page(&self.pool, &page.url).await {
                    Ok(count) if count == want => {}
                    Ok(_) => continue,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            match self.claim(page.id).await {
                Ok(true) => {
                    debug!("[{}] Claimed page {}", self.worker_id, page.id);
                    claimed.push(page);
                }
                Ok(false) => {
                    debug!(
                        "[{}] Page {} already claimed by another worker",
                        self.worker_id, page.id
                    );
                    skipped += 1;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        // A selection error must not strand pages we already claimed
        if let Some(e) = failure {
            for page in &claimed {
                if let Err(release_err) = self.release(page.id).await {
                    warn!(
                        "[{}] Failed to release page {} after selection error: {}",
                        self.worker_id, page.id, release_err
                    );
                }
            }
            return Err(e);
        }

        info!(
            "[{}] Selected {} page(s), {} lost to races",
            self.worker_id,
            claimed.len(),
            skipped
        );

        Ok(ClaimOutcome { claimed, skipped })
    }

    fn lease_deadline(&self) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(self.lease_duration.as_secs() as i64)
    }
}
