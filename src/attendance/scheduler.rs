use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::gate::Day;
use super::storage::ObjectStore;
use super::store::RecordStore;
use super::sweeper::RetentionSweeper;

/// Next instant strictly after `now` at `hour`:00 in the reference timezone.
pub fn next_run_after(now: DateTime<Utc>, hour: u32, timezone: FixedOffset) -> DateTime<Utc> {
    let today = Day::containing(now, timezone).start + Duration::hours(i64::from(hour));
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Runs the sweep once a day at `hour` until the task is aborted.
pub fn spawn_daily_sweep<S, O>(
    sweeper: Arc<RetentionSweeper<S, O>>,
    hour: u32,
    timezone: FixedOffset,
) -> JoinHandle<()>
where
    S: RecordStore + 'static,
    O: ObjectStore + 'static,
{
    actix_web::rt::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_run_after(now, hour, timezone);
            info!(%next, "Next photo retention sweep scheduled");

            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            if let Err(e) = sweeper.sweep().await {
                error!(error = %e, "Scheduled photo retention sweep failed");
            }
        }
    })
}
