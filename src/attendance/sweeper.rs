use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use super::storage::{FailureKind, ObjectStore, ReclaimPolicy, with_timeout};
use super::store::{RecordStore, StoreError};
use crate::config::AttendanceConfig;
use crate::model::attendance::AttendanceRecord;

/// Aggregate outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepReport {
    /// Eligible records looked at.
    pub scanned: u64,
    /// Photos deleted and records reclaimed.
    pub deleted: u64,
    /// Left untouched for the next run.
    pub failed: u64,
    /// Force-closed after a permanent delete failure; needs an operator.
    pub flagged: u64,
}

/// A page could not be read; the records handled so far are in `report`.
#[derive(Debug, Error)]
#[error("sweep stopped early ({report:?}): {source}")]
pub struct SweepError {
    pub report: SweepReport,
    #[source]
    pub source: StoreError,
}

enum Reclaim {
    Deleted,
    Flagged,
    Failed,
}

/// Deletes photos past the retention window.
///
/// Eligibility is `check_in_at < now - retention_window` and not yet
/// reclaimed, so a photo exactly one window old survives until the next run.
/// Re-running with the same predicate picks up whatever a previous run left.
pub struct RetentionSweeper<S, O> {
    store: Arc<S>,
    objects: Arc<O>,
    policy: ReclaimPolicy,
    retention_window: chrono::Duration,
    page_size: u32,
    timeout: Duration,
    run_lock: Mutex<()>,
}

impl<S: RecordStore, O: ObjectStore> RetentionSweeper<S, O> {
    pub fn new(store: Arc<S>, objects: Arc<O>, config: &AttendanceConfig) -> Self {
        Self {
            store,
            objects,
            policy: ReclaimPolicy::new(config.permanent_delete_statuses.clone()),
            retention_window: config.retention_window,
            page_size: config.sweep_page_size.max(1),
            timeout: config.storage_timeout,
            run_lock: Mutex::new(()),
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport, SweepError> {
        self.sweep_at(Utc::now()).await
    }

    /// Runs one sweep. Overlapping callers wait for the running sweep to
    /// finish and then start their own.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        let _running = self.run_lock.lock().await;

        let cutoff = now - self.retention_window;
        let mut report = SweepReport::default();
        let mut after_id = 0;

        info!(%cutoff, "Photo retention sweep started");

        loop {
            let page = match self
                .store
                .find_reclaimable(cutoff, after_id, self.page_size)
                .await
            {
                Ok(page) => page,
                Err(source) => {
                    error!(error = %source, after_id, "Failed to read reclaimable records");
                    return Err(SweepError { report, source });
                }
            };

            let Some(last) = page.last() else { break };
            after_id = last.id;
            let full_page = page.len() as u32 == self.page_size;

            for record in &page {
                report.scanned += 1;
                match self.reclaim(record).await {
                    Reclaim::Deleted => report.deleted += 1,
                    Reclaim::Flagged => report.flagged += 1,
                    Reclaim::Failed => report.failed += 1,
                }
            }

            if !full_page {
                break;
            }
        }

        info!(
            scanned = report.scanned,
            deleted = report.deleted,
            failed = report.failed,
            flagged = report.flagged,
            "Photo retention sweep completed"
        );

        Ok(report)
    }

    async fn reclaim(&self, record: &AttendanceRecord) -> Reclaim {
        let storage_id = record.photo.storage_id.as_str();

        let flagged = match with_timeout(self.timeout, self.objects.delete(storage_id)).await {
            Ok(()) => false,
            Err(e) => match self.policy.classify(&e) {
                FailureKind::Transient => {
                    warn!(
                        error = %e,
                        record_id = record.id,
                        storage_id,
                        "Photo delete failed, will retry next sweep"
                    );
                    return Reclaim::Failed;
                }
                FailureKind::Permanent => {
                    warn!(
                        error = %e,
                        record_id = record.id,
                        storage_id,
                        "Photo cannot be deleted, closing record for operator review"
                    );
                    true
                }
            },
        };

        match self.store.mark_reclaimed(record.id, flagged).await {
            Ok(true) if flagged => Reclaim::Flagged,
            Ok(true) => {
                debug!(record_id = record.id, "Photo reclaimed");
                Reclaim::Deleted
            }
            Ok(false) => {
                // Already closed elsewhere; nothing left to do for this record.
                debug!(record_id = record.id, "Record was already reclaimed");
                Reclaim::Deleted
            }
            Err(e) => {
                error!(error = %e, record_id = record.id, "Failed to mark record reclaimed");
                Reclaim::Failed
            }
        }
    }
}
