//! In-memory stand-ins for the record store and object store.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use image::{DynamicImage, ImageFormat, RgbImage};

use super::gate::Day;
use super::storage::{ObjectStore, StorageError};
use super::store::{InsertOutcome, RecordStore, StoreError};
use crate::config::AttendanceConfig;
use crate::model::attendance::{AttendanceRecord, EmployeeSnapshot, NewAttendanceRecord, PhotoRef};

pub fn test_config() -> AttendanceConfig {
    AttendanceConfig {
        storage_timeout: Duration::from_secs(2),
        ..AttendanceConfig::default()
    }
}

pub fn snapshot(code: &str) -> EmployeeSnapshot {
    EmployeeSnapshot {
        name: "John Doe".into(),
        email: "john.doe@company.com".into(),
        department: "Engineering".into(),
        employee_code: code.into(),
    }
}

/// A record checked in at `at` (UTC day), not yet stored.
pub fn new_record(employee_id: u64, at: DateTime<Utc>) -> NewAttendanceRecord {
    let storage_id = format!("attendance/employee-{employee_id}-{}", at.timestamp_millis());
    NewAttendanceRecord {
        employee_id,
        snapshot: snapshot("E1"),
        check_in_at: at,
        check_in_day: Day::containing(at, FixedOffset::east_opt(0).unwrap()).date,
        photo: PhotoRef {
            url: format!("https://cdn.test/{storage_id}.png"),
            storage_id,
        },
        location: None,
    }
}

pub fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(4, 4))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Vec<AttendanceRecord>>,
    next_id: AtomicU64,
    fail_inserts: AtomicBool,
    fail_reads: AtomicBool,
    fail_updates: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn seed(&self, record: NewAttendanceRecord) -> AttendanceRecord {
        let record = record.into_record(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.records.lock().unwrap().push(record.clone());
        record
    }

    pub fn get(&self, id: u64) -> Option<AttendanceRecord> {
        self.records.lock().unwrap().iter().find(|r| r.id == id).cloned()
    }

    pub fn records_for(&self, employee_id: u64) -> Vec<AttendanceRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.employee_id == employee_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        } else {
            Ok(())
        }
    }
}

impl RecordStore for InMemoryRecordStore {
    async fn insert_if_absent(
        &self,
        record: NewAttendanceRecord,
    ) -> Result<InsertOutcome, StoreError> {
        Self::check(&self.fail_inserts)?;

        let mut records = self.records.lock().unwrap();
        let taken = records
            .iter()
            .any(|r| r.employee_id == record.employee_id && r.check_in_day == record.check_in_day);
        if taken {
            return Ok(InsertOutcome::Duplicate);
        }

        let record = record.into_record(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        records.push(record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    async fn find_in_window(
        &self,
        employee_id: u64,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Self::check(&self.fail_reads)?;

        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.employee_id == employee_id)
            .filter(|r| r.check_in_at >= from && r.check_in_at < until)
            .min_by_key(|r| r.check_in_at)
            .cloned())
    }

    async fn find_reclaimable(
        &self,
        cutoff: DateTime<Utc>,
        after_id: u64,
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        Self::check(&self.fail_reads)?;

        let mut page: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.check_in_at < cutoff && !r.photo_reclaimed && r.id > after_id)
            .cloned()
            .collect();
        page.sort_by_key(|r| r.id);
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn mark_reclaimed(&self, id: u64, flagged: bool) -> Result<bool, StoreError> {
        Self::check(&self.fail_updates)?;

        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == id && !r.photo_reclaimed) {
            Some(record) => {
                record.photo_reclaimed = true;
                record.reclaim_flagged = flagged;
                record.photo.url.clear();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct FakeObjectStore {
    blobs: Mutex<HashSet<String>>,
    delete_failures: Mutex<HashMap<String, StorageError>>,
    fail_all_deletes: Mutex<Option<StorageError>>,
    fail_uploads: AtomicBool,
    yield_on_upload: AtomicBool,
    yield_on_delete: AtomicBool,
    upload_delay: Mutex<Option<Duration>>,
    delete_delay: Mutex<Option<Duration>>,
    uploads: AtomicUsize,
    deletes: AtomicUsize,
}

impl FakeObjectStore {
    pub fn put(&self, storage_id: &str) {
        self.blobs.lock().unwrap().insert(storage_id.to_string());
    }

    pub fn contains(&self, storage_id: &str) -> bool {
        self.blobs.lock().unwrap().contains(storage_id)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Successful deletes, including deletes of absent blobs.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, storage_id: &str, err: StorageError) {
        self.delete_failures
            .lock()
            .unwrap()
            .insert(storage_id.to_string(), err);
    }

    pub fn fail_all_deletes(&self, err: Option<StorageError>) {
        *self.fail_all_deletes.lock().unwrap() = err;
    }

    pub fn clear_failures(&self) {
        self.delete_failures.lock().unwrap().clear();
        *self.fail_all_deletes.lock().unwrap() = None;
    }

    pub fn yield_on_upload(&self, on: bool) {
        self.yield_on_upload.store(on, Ordering::SeqCst);
    }

    pub fn yield_on_delete(&self, on: bool) {
        self.yield_on_delete.store(on, Ordering::SeqCst);
    }

    pub fn delay_uploads(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = Some(delay);
    }

    pub fn delay_deletes(&self, delay: Duration) {
        *self.delete_delay.lock().unwrap() = Some(delay);
    }
}

impl ObjectStore for FakeObjectStore {
    async fn upload(&self, bytes: Vec<u8>, name_hint: &str) -> Result<PhotoRef, StorageError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.yield_on_upload.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        let delay = *self.upload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Status {
                status: 500,
                message: "upload failed".into(),
            });
        }
        assert!(!bytes.is_empty());

        let storage_id = format!("attendance/{name_hint}");
        self.put(&storage_id);
        Ok(PhotoRef {
            url: format!("https://cdn.test/{storage_id}.png"),
            storage_id,
        })
    }

    async fn delete(&self, storage_id: &str) -> Result<(), StorageError> {
        if self.yield_on_delete.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        let delay = *self.delete_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let injected = self.fail_all_deletes.lock().unwrap().clone();
        if let Some(err) = injected {
            return Err(err);
        }
        let injected = self.delete_failures.lock().unwrap().get(storage_id).cloned();
        if let Some(err) = injected {
            return Err(err);
        }

        self.blobs.lock().unwrap().remove(storage_id);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
