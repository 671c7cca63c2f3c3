use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::ImageReader;
use tracing::{debug, error, info, instrument, warn};

use super::error::CheckInError;
use super::gate::AttendanceGate;
use super::storage::{ObjectStore, object_name, with_timeout};
use super::store::{InsertOutcome, RecordStore};
use crate::config::AttendanceConfig;
use crate::model::attendance::{
    AttendanceRecord, EmployeeSnapshot, Location, NewAttendanceRecord, PhotoRef,
};

pub struct CheckInRequest {
    pub employee_id: u64,
    pub snapshot: EmployeeSnapshot,
    pub photo: Vec<u8>,
    pub location: Option<Location>,
}

/// An upload that is not yet backed by a record. It must end in either
/// [`TentativeUpload::confirm`] or [`TentativeUpload::compensate`].
struct TentativeUpload<'a, O> {
    objects: &'a O,
    photo: PhotoRef,
    timeout: Duration,
}

impl<'a, O: ObjectStore> TentativeUpload<'a, O> {
    async fn acquire(
        objects: &'a O,
        bytes: Vec<u8>,
        name: &str,
        timeout: Duration,
    ) -> Result<Self, CheckInError> {
        let photo = with_timeout(timeout, objects.upload(bytes, name))
            .await
            .map_err(CheckInError::StorageUnavailable)?;

        Ok(Self {
            objects,
            photo,
            timeout,
        })
    }

    fn photo(&self) -> &PhotoRef {
        &self.photo
    }

    /// The record now references the blob; keep it.
    fn confirm(self) {
        debug!(storage_id = %self.photo.storage_id, "Upload confirmed");
    }

    /// Best-effort removal of the blob. Failure is logged, never returned.
    async fn compensate(self, reason: &str) {
        let storage_id = self.photo.storage_id;
        match with_timeout(self.timeout, self.objects.delete(&storage_id)).await {
            Ok(()) => info!(%storage_id, reason, "Removed orphaned upload"),
            Err(e) => error!(
                error = %e,
                %storage_id,
                reason,
                "Failed to remove orphaned upload"
            ),
        }
    }
}

/// Gate re-check, upload, then conditional insert, in that order.
pub struct CheckInService<S, O> {
    store: Arc<S>,
    objects: Arc<O>,
    gate: AttendanceGate<S>,
    config: AttendanceConfig,
}

impl<S: RecordStore, O: ObjectStore> CheckInService<S, O> {
    pub fn new(store: Arc<S>, objects: Arc<O>, config: AttendanceConfig) -> Self {
        let gate = AttendanceGate::new(store.clone(), config.timezone);
        Self {
            store,
            objects,
            gate,
            config,
        }
    }

    pub fn gate(&self) -> &AttendanceGate<S> {
        &self.gate
    }

    pub async fn check_in(&self, request: CheckInRequest) -> Result<AttendanceRecord, CheckInError> {
        self.check_in_at(request, Utc::now()).await
    }

    #[instrument(
        name = "attendance_check_in",
        skip(self, request),
        fields(employee_id = request.employee_id)
    )]
    pub async fn check_in_at(
        &self,
        request: CheckInRequest,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, CheckInError> {
        validate_photo(&request.photo, self.config.max_photo_bytes)?;

        // Saves an upload for the common duplicate case; not the enforcement.
        let allowed = self
            .gate
            .can_check_in(request.employee_id, now)
            .await
            .map_err(|e| {
                error!(error = %e, "Daily gate lookup failed");
                CheckInError::PersistenceFailed(e)
            })?;
        if !allowed {
            info!("Rejected: already checked in today");
            return Err(CheckInError::AlreadyCheckedIn);
        }

        let name = object_name(&request.snapshot.employee_code, now);
        let upload = TentativeUpload::acquire(
            self.objects.as_ref(),
            request.photo,
            &name,
            self.config.storage_timeout,
        )
        .await
        .inspect_err(|e| warn!(error = %e, "Photo upload failed"))?;

        let record = NewAttendanceRecord {
            employee_id: request.employee_id,
            snapshot: request.snapshot,
            check_in_at: now,
            check_in_day: self.gate.day_of(now).date,
            photo: upload.photo().clone(),
            location: request.location,
        };

        match self.store.insert_if_absent(record).await {
            Ok(InsertOutcome::Inserted(record)) => {
                upload.confirm();
                info!(record_id = record.id, "Check-in recorded");
                Ok(record)
            }
            Ok(InsertOutcome::Duplicate) => {
                info!("Lost same-day race to a concurrent check-in");
                upload.compensate("duplicate check-in").await;
                Err(CheckInError::AlreadyCheckedIn)
            }
            Err(e) => {
                error!(error = %e, "Failed to write attendance record");
                upload.compensate("record write failed").await;
                Err(CheckInError::PersistenceFailed(e))
            }
        }
    }
}

/// Size limits plus a readable image header in a supported format.
pub fn validate_photo(bytes: &[u8], max_bytes: usize) -> Result<(), CheckInError> {
    if bytes.is_empty() {
        return Err(CheckInError::InvalidPhoto("photo is required".into()));
    }
    if bytes.len() > max_bytes {
        return Err(CheckInError::InvalidPhoto(format!(
            "photo exceeds {max_bytes} bytes"
        )));
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CheckInError::InvalidPhoto(e.to_string()))?;
    if reader.format().is_none() {
        return Err(CheckInError::InvalidPhoto("unrecognised image format".into()));
    }
    reader
        .into_dimensions()
        .map_err(|e| CheckInError::InvalidPhoto(e.to_string()))?;

    Ok(())
}
