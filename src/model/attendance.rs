use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Employee profile fields copied onto the record at check-in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EmployeeSnapshot {
    #[schema(example = "John Doe")]
    pub name: String,
    #[schema(example = "john.doe@company.com")]
    pub email: String,
    #[schema(example = "Engineering")]
    pub department: String,
    #[schema(example = "EMP-001")]
    pub employee_code: String,
}

/// Where the photo lives in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PhotoRef {
    /// Empty once the photo has been reclaimed.
    #[schema(example = "https://res.cloudinary.com/demo/image/upload/attendance/employee-EMP-001.jpg")]
    pub url: String,
    #[schema(example = "attendance/employee-EMP-001-1704096000000-1a2b3c4d")]
    pub storage_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    #[schema(example = 23.8103)]
    pub latitude: f64,
    #[schema(example = 90.4125)]
    pub longitude: f64,
    #[schema(example = 12.5, nullable = true)]
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[serde(flatten)]
    pub snapshot: EmployeeSnapshot,
    #[schema(example = "2024-01-01T08:00:00Z", format = "date-time", value_type = String)]
    pub check_in_at: DateTime<Utc>,
    /// Calendar day in the reference timezone; unique per employee.
    #[schema(example = "2024-01-01", format = "date", value_type = String)]
    pub check_in_day: NaiveDate,
    pub photo: PhotoRef,
    #[schema(nullable = true)]
    pub location: Option<Location>,
    pub photo_reclaimed: bool,
    pub reclaim_flagged: bool,
}

/// A record that has not been written yet; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewAttendanceRecord {
    pub employee_id: u64,
    pub snapshot: EmployeeSnapshot,
    pub check_in_at: DateTime<Utc>,
    pub check_in_day: NaiveDate,
    pub photo: PhotoRef,
    pub location: Option<Location>,
}

impl NewAttendanceRecord {
    pub fn into_record(self, id: u64) -> AttendanceRecord {
        AttendanceRecord {
            id,
            employee_id: self.employee_id,
            snapshot: self.snapshot,
            check_in_at: self.check_in_at,
            check_in_day: self.check_in_day,
            photo: self.photo,
            location: self.location,
            photo_reclaimed: false,
            reclaim_flagged: false,
        }
    }
}

/// Flat row shape of `attendance_records`.
#[derive(Debug, sqlx::FromRow)]
pub struct AttendanceRow {
    pub id: u64,
    pub employee_id: u64,
    pub name: String,
    pub email: String,
    pub department: String,
    pub employee_code: String,
    pub check_in_at: DateTime<Utc>,
    pub check_in_day: NaiveDate,
    pub photo_url: String,
    pub storage_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub photo_reclaimed: bool,
    pub reclaim_flagged: bool,
}

impl From<AttendanceRow> for AttendanceRecord {
    fn from(row: AttendanceRow) -> Self {
        let location = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(Location {
                latitude,
                longitude,
                accuracy: row.accuracy,
            }),
            _ => None,
        };

        AttendanceRecord {
            id: row.id,
            employee_id: row.employee_id,
            snapshot: EmployeeSnapshot {
                name: row.name,
                email: row.email,
                department: row.department,
                employee_code: row.employee_code,
            },
            check_in_at: row.check_in_at,
            check_in_day: row.check_in_day,
            photo: PhotoRef {
                url: row.photo_url,
                storage_id: row.storage_id,
            },
            location,
            photo_reclaimed: row.photo_reclaimed,
            reclaim_flagged: row.reclaim_flagged,
        }
    }
}

/// Column list matching [`AttendanceRow`].
pub const RECORD_COLUMNS: &str = "id, employee_id, name, email, department, employee_code, \
     check_in_at, check_in_day, photo_url, storage_id, latitude, longitude, accuracy, \
     photo_reclaimed, reclaim_flagged";
