use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use thiserror::Error;

use crate::model::attendance::{
    AttendanceRecord, AttendanceRow, NewAttendanceRecord, RECORD_COLUMNS,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of a conditional insert on `(employee_id, check_in_day)`.
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(AttendanceRecord),
    /// A record for that employee and day already exists; nothing was written.
    Duplicate,
}

/// Durable attendance records.
///
/// `insert_if_absent` must be atomic: it is the only thing standing between
/// two concurrent check-ins of the same employee on the same day.
pub trait RecordStore: Send + Sync {
    fn insert_if_absent(
        &self,
        record: NewAttendanceRecord,
    ) -> impl Future<Output = Result<InsertOutcome, StoreError>> + Send;

    /// First record of `employee_id` with `from <= check_in_at < until`.
    fn find_in_window(
        &self,
        employee_id: u64,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<AttendanceRecord>, StoreError>> + Send;

    /// Unreclaimed records with `check_in_at < cutoff` and `id > after_id`,
    /// ascending by id, at most `limit` of them.
    fn find_reclaimable(
        &self,
        cutoff: DateTime<Utc>,
        after_id: u64,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<AttendanceRecord>, StoreError>> + Send;

    /// Sets `photo_reclaimed`, clears the photo url and records `flagged`.
    /// Returns false when the record was missing or already reclaimed.
    fn mark_reclaimed(
        &self,
        id: u64,
        flagged: bool,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// MySQL backed store; uniqueness comes from the
/// `uq_attendance_employee_day` index.
#[derive(Clone)]
pub struct MySqlRecordStore {
    pool: MySqlPool,
}

impl MySqlRecordStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl RecordStore for MySqlRecordStore {
    async fn insert_if_absent(
        &self,
        record: NewAttendanceRecord,
    ) -> Result<InsertOutcome, StoreError> {
        let (latitude, longitude, accuracy) = match record.location {
            Some(l) => (Some(l.latitude), Some(l.longitude), l.accuracy),
            None => (None, None, None),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO attendance_records
                (employee_id, name, email, department, employee_code,
                 check_in_at, check_in_day, photo_url, storage_id,
                 latitude, longitude, accuracy)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.employee_id)
        .bind(&record.snapshot.name)
        .bind(&record.snapshot.email)
        .bind(&record.snapshot.department)
        .bind(&record.snapshot.employee_code)
        .bind(record.check_in_at)
        .bind(record.check_in_day)
        .bind(&record.photo.url)
        .bind(&record.photo.storage_id)
        .bind(latitude)
        .bind(longitude)
        .bind(accuracy)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(InsertOutcome::Inserted(
                record.into_record(done.last_insert_id()),
            )),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_in_window(
        &self,
        employee_id: u64,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM attendance_records
            WHERE employee_id = ?
            AND check_in_at >= ?
            AND check_in_at < ?
            ORDER BY check_in_at
            LIMIT 1
            "#
        );

        let row = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(employee_id)
            .bind(from)
            .bind(until)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(AttendanceRecord::from))
    }

    async fn find_reclaimable(
        &self,
        cutoff: DateTime<Utc>,
        after_id: u64,
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM attendance_records
            WHERE check_in_at < ?
            AND photo_reclaimed = FALSE
            AND id > ?
            ORDER BY id
            LIMIT ?
            "#
        );

        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(cutoff)
            .bind(after_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(AttendanceRecord::from).collect())
    }

    async fn mark_reclaimed(&self, id: u64, flagged: bool) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE attendance_records
            SET photo_reclaimed = TRUE,
                photo_url = '',
                reclaim_flagged = ?
            WHERE id = ?
            AND photo_reclaimed = FALSE
            "#,
        )
        .bind(flagged)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
