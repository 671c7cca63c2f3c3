use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};

use super::store::{RecordStore, StoreError};
use crate::model::attendance::AttendanceRecord;

/// The calendar day containing an instant, in a reference timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Day {
    pub date: NaiveDate,
    /// Local midnight, as UTC.
    pub start: DateTime<Utc>,
    /// Next local midnight, as UTC.
    pub end: DateTime<Utc>,
}

impl Day {
    pub fn containing(now: DateTime<Utc>, timezone: FixedOffset) -> Self {
        let date = now.with_timezone(&timezone).date_naive();
        let offset = Duration::seconds(i64::from(timezone.local_minus_utc()));
        let start = (date.and_time(NaiveTime::MIN) - offset).and_utc();

        Day {
            date,
            start,
            end: start + Duration::days(1),
        }
    }
}

/// Read-only daily check-in rule. Advisory: the store's unique key is what
/// actually enforces one record per day.
pub struct AttendanceGate<S> {
    store: Arc<S>,
    timezone: FixedOffset,
}

impl<S: RecordStore> AttendanceGate<S> {
    pub fn new(store: Arc<S>, timezone: FixedOffset) -> Self {
        Self { store, timezone }
    }

    pub fn day_of(&self, now: DateTime<Utc>) -> Day {
        Day::containing(now, self.timezone)
    }

    /// The employee's record for the day containing `now`, if any.
    pub async fn todays_record(
        &self,
        employee_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let day = self.day_of(now);
        self.store
            .find_in_window(employee_id, day.start, day.end)
            .await
    }

    pub async fn can_check_in(
        &self,
        employee_id: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.todays_record(employee_id, now).await?.is_none())
    }
}
