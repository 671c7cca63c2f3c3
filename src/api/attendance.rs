use crate::attendance::{CheckInError, CheckInRequest, SweepReport};
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::directory;
use crate::model::attendance::{AttendanceRecord, AttendanceRow, Location, RECORD_COLUMNS};
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::error::{ErrorBadRequest, ErrorForbidden, ErrorInternalServerError};
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

/// Multipart body of a check-in (documentation only).
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct CheckInUpload {
    /// Selfie, any common image format
    #[schema(value_type = String, format = Binary)]
    pub photo: Vec<u8>,
    #[schema(example = 23.8103)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125)]
    pub longitude: Option<f64>,
    #[schema(example = 12.5)]
    pub accuracy: Option<f64>,
}

#[derive(Serialize, ToSchema)]
pub struct CheckInResponse {
    #[schema(example = "Check-in recorded successfully")]
    pub message: String,
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "2024-01-01T08:00:00Z", format = "date-time", value_type = String)]
    pub check_in_at: DateTime<Utc>,
    #[schema(example = "https://res.cloudinary.com/demo/image/upload/attendance/employee-EMP-001.jpg")]
    pub photo_url: String,
}

#[derive(Serialize, ToSchema)]
pub struct CheckInStatus {
    #[schema(example = false)]
    pub checked_in_today: bool,
    #[schema(nullable = true)]
    pub record: Option<AttendanceRecord>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<AttendanceRecord>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct HistoryQuery {
    /// Pagination page number (start with 1)
    #[schema(example = 1)]
    pub page: Option<u64>,
    /// Pagination per page number
    #[schema(example = 10)]
    pub per_page: Option<u64>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct RecordFilter {
    /// Substring of name, email, employee code or department
    #[schema(example = "doe")]
    pub search: Option<String>,
    /// Filter by employee ID
    #[schema(example = 1000)]
    pub employee_id: Option<u64>,
    /// First day to include
    #[schema(example = "2024-01-01", format = "date", value_type = String)]
    pub start_date: Option<NaiveDate>,
    /// Last day to include
    #[schema(example = "2024-01-31", format = "date", value_type = String)]
    pub end_date: Option<NaiveDate>,
    #[schema(example = 1)]
    pub page: Option<u64>,
    #[schema(example = 10)]
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceStats {
    #[schema(example = 42)]
    pub today_check_ins: i64,
    #[schema(example = 250)]
    pub weekly_check_ins: i64,
    /// Photos force-closed by the sweeper that need an operator
    #[schema(example = 0)]
    pub flagged_photos: i64,
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Str(String),
    Date(NaiveDate),
}

/// `(page, per_page, offset)`; page is 1-based and capped at `u32::MAX`,
/// per_page capped at 100.
fn page_bounds(page: Option<u64>, per_page: Option<u64>) -> (u32, u32, u64) {
    let per_page = per_page.unwrap_or(10).clamp(1, 100) as u32;
    let page = page.unwrap_or(1).clamp(1, u64::from(u32::MAX)) as u32;
    (page, per_page, u64::from(page - 1) * u64::from(per_page))
}

/// A location is kept only when both coordinates were sent.
fn build_location(
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
) -> Result<Option<Location>, String> {
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        return Ok(None);
    };
    if !(-90.0..=90.0).contains(&latitude) {
        return Err("latitude must be between -90 and 90".into());
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err("longitude must be between -180 and 180".into());
    }
    if accuracy.is_some_and(|a| a.is_nan() || a < 0.0) {
        return Err("accuracy must be a positive number".into());
    }

    Ok(Some(Location {
        latitude,
        longitude,
        accuracy,
    }))
}

struct CheckInForm {
    photo: Vec<u8>,
    location: Option<Location>,
}

/// Collects the single `photo` field of a check-in form.
#[derive(Default)]
struct PhotoField {
    bytes: Option<Vec<u8>>,
}

impl PhotoField {
    /// Opens the field; a second `photo` part is refused.
    fn begin(&mut self) -> Result<(), CheckInError> {
        if self.bytes.is_some() {
            return Err(CheckInError::InvalidPhoto(
                "only one photo may be uploaded".into(),
            ));
        }
        self.bytes = Some(Vec::new());
        Ok(())
    }

    fn push(&mut self, chunk: &[u8], max_bytes: usize) -> Result<(), CheckInError> {
        let bytes = self.bytes.get_or_insert_with(Vec::new);
        if bytes.len() + chunk.len() > max_bytes {
            return Err(CheckInError::InvalidPhoto(format!(
                "photo exceeds {max_bytes} bytes"
            )));
        }
        bytes.extend_from_slice(chunk);
        Ok(())
    }

    fn into_bytes(self) -> Vec<u8> {
        self.bytes.unwrap_or_default()
    }
}

async fn read_check_in_form(
    mut payload: Multipart,
    max_photo_bytes: usize,
) -> actix_web::Result<CheckInForm> {
    let mut photo = PhotoField::default();
    let mut coords: [Option<f64>; 3] = [None; 3];

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().to_string();

        match name.as_str() {
            "photo" => {
                if let Some(ct) = field.content_type() {
                    if ct.type_().as_str() != "image" {
                        return Err(
                            CheckInError::InvalidPhoto("only image files are allowed".into())
                                .into(),
                        );
                    }
                }
                photo.begin()?;
                while let Some(chunk) = field.try_next().await? {
                    photo.push(&chunk, max_photo_bytes)?;
                }
            }
            "latitude" | "longitude" | "accuracy" => {
                let mut raw = Vec::new();
                while let Some(chunk) = field.try_next().await? {
                    if raw.len() + chunk.len() > 64 {
                        return Err(ErrorBadRequest(format!("{name} is too long")));
                    }
                    raw.extend_from_slice(&chunk);
                }
                let text = String::from_utf8_lossy(&raw);
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                let value: f64 = text
                    .parse()
                    .map_err(|_| ErrorBadRequest(format!("{name} must be a number")))?;
                let slot = match name.as_str() {
                    "latitude" => 0,
                    "longitude" => 1,
                    _ => 2,
                };
                coords[slot] = Some(value);
            }
            // unknown fields are drained and ignored
            _ => while field.try_next().await?.is_some() {},
        }
    }

    let location = build_location(coords[0], coords[1], coords[2]).map_err(ErrorBadRequest)?;

    Ok(CheckInForm {
        photo: photo.into_bytes(),
        location,
    })
}

/// Daily check-in with a selfie
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body(
        content = CheckInUpload,
        description = "Selfie plus optional geolocation",
        content_type = "multipart/form-data"
    ),
    responses(
        (status = 201, description = "Check-in recorded", body = CheckInResponse),
        (status = 400, description = "Invalid photo or location", body = Object, example = json!({
            "message": "Invalid photo: photo is required",
            "code": "invalid_photo"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Already checked in today", body = Object, example = json!({
            "message": "You have already checked in today",
            "code": "already_checked_in"
        })),
        (status = 503, description = "Photo storage unavailable, safe to retry"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    state: web::Data<AppState>,
    config: web::Data<Config>,
    payload: Multipart,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;

    let form = read_check_in_form(payload, config.attendance.max_photo_bytes).await?;

    let snapshot = directory::employee_snapshot(pool.get_ref(), employee_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, employee_id, "Failed to load employee profile");
            ErrorInternalServerError("Internal Server Error")
        })?
        .ok_or_else(|| ErrorForbidden("Employee profile not found or inactive"))?;

    let record = state
        .check_in
        .check_in(CheckInRequest {
            employee_id,
            snapshot,
            photo: form.photo,
            location: form.location,
        })
        .await?;

    Ok(HttpResponse::Created().json(CheckInResponse {
        message: "Check-in recorded successfully".to_string(),
        id: record.id,
        check_in_at: record.check_in_at,
        photo_url: record.photo.url,
    }))
}

/// Whether the caller may still check in today
#[utoipa::path(
    get,
    path = "/api/attendance/status",
    responses(
        (status = 200, description = "Today's check-in status", body = CheckInStatus),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in_status(
    auth: AuthUser,
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;

    let record = state
        .check_in
        .gate()
        .todays_record(employee_id, Utc::now())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, employee_id, "Check-in status lookup failed");
            ErrorInternalServerError("Internal Server Error")
        })?;

    Ok(HttpResponse::Ok().json(CheckInStatus {
        checked_in_today: record.is_some(),
        record,
    }))
}

/// The caller's own check-ins, newest first
#[utoipa::path(
    get,
    path = "/api/attendance/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Paginated check-in history", body = AttendanceListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<HistoryQuery>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;
    let (page, per_page, offset) = page_bounds(query.page, query.per_page);

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM attendance_records WHERE employee_id = ?",
    )
    .bind(employee_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| {
        tracing::error!(error = %e, employee_id, "Failed to count check-in history");
        ErrorInternalServerError("Internal Server Error")
    })?;

    let sql = format!(
        r#"
        SELECT {RECORD_COLUMNS}
        FROM attendance_records
        WHERE employee_id = ?
        ORDER BY check_in_at DESC
        LIMIT ? OFFSET ?
        "#
    );
    let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
        .bind(employee_id)
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, employee_id, "Failed to fetch check-in history");
            ErrorInternalServerError("Internal Server Error")
        })?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data: rows.into_iter().map(AttendanceRecord::from).collect(),
        page,
        per_page,
        total,
    }))
}

/// All check-ins with search and date filters (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/attendance/records",
    params(RecordFilter),
    responses(
        (status = 200, description = "Paginated attendance records", body = AttendanceListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn list_records(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RecordFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let (page, per_page, offset) = page_bounds(query.page, query.per_page);

    // -------------------------
    // WHERE clause
    // -------------------------
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    if let Some(emp_id) = query.employee_id {
        where_sql.push_str(" AND employee_id = ?");
        args.push(FilterValue::U64(emp_id));
    }

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        where_sql.push_str(
            " AND (name LIKE ? OR email LIKE ? OR employee_code LIKE ? OR department LIKE ?)",
        );
        let pattern = format!("%{}%", escape_like(search));
        for _ in 0..4 {
            args.push(FilterValue::Str(pattern.clone()));
        }
    }

    if let Some(start) = query.start_date {
        where_sql.push_str(" AND check_in_day >= ?");
        args.push(FilterValue::Date(start));
    }

    if let Some(end) = query.end_date {
        where_sql.push_str(" AND check_in_day <= ?");
        args.push(FilterValue::Date(end));
    }

    // -------------------------
    // COUNT query
    // -------------------------
    let count_sql = format!("SELECT COUNT(*) FROM attendance_records{}", where_sql);

    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(s.as_str()),
            FilterValue::Date(d) => count_q.bind(*d),
        };
    }

    let total = count_q.fetch_one(pool.get_ref()).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to count attendance records");
        ErrorInternalServerError("Internal Server Error")
    })?;

    // -------------------------
    // DATA query
    // -------------------------
    let data_sql = format!(
        r#"
        SELECT {RECORD_COLUMNS}
        FROM attendance_records
        {where_sql}
        ORDER BY check_in_at DESC
        LIMIT ? OFFSET ?
        "#
    );

    let mut data_q = sqlx::query_as::<_, AttendanceRow>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
            FilterValue::Date(d) => data_q.bind(d),
        };
    }

    let rows = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch attendance records");
            ErrorInternalServerError("Internal Server Error")
        })?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data: rows.into_iter().map(AttendanceRecord::from).collect(),
        page,
        per_page,
        total,
    }))
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Dashboard counters (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/attendance/stats",
    responses(
        (status = 200, description = "Attendance counters", body = AttendanceStats),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let now = Utc::now();
    let today = state.check_in.gate().day_of(now).date;

    let counts = sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
        SELECT
            CAST(COALESCE(SUM(check_in_day = ?), 0) AS SIGNED),
            CAST(COALESCE(SUM(check_in_at >= ?), 0) AS SIGNED),
            CAST(COALESCE(SUM(reclaim_flagged), 0) AS SIGNED)
        FROM attendance_records
        "#,
    )
    .bind(today)
    .bind(now - Duration::days(7))
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to compute attendance stats");
        ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok().json(AttendanceStats {
        today_check_ins: counts.0,
        weekly_check_ins: counts.1,
        flagged_photos: counts.2,
    }))
}

/// Run the photo retention sweep now (Admin)
#[utoipa::path(
    post,
    path = "/api/attendance/sweep",
    responses(
        (status = 200, description = "Sweep finished", body = SweepReport),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Sweep stopped early", body = Object, example = json!({
            "message": "Photo sweep stopped early",
            "report": {"scanned": 3, "deleted": 3, "failed": 0, "flagged": 0}
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn run_sweep(
    auth: AuthUser,
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    tracing::info!(
        user_id = auth.user_id,
        username = %auth.username,
        "Manual photo sweep requested"
    );

    match state.sweeper.sweep().await {
        Ok(report) => Ok(HttpResponse::Ok().json(report)),
        Err(e) => {
            tracing::error!(error = %e, "Manual photo sweep failed");
            Ok(HttpResponse::InternalServerError().json(serde_json::json!({
                "message": "Photo sweep stopped early",
                "report": e.report,
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds_defaults_and_caps() {
        assert_eq!(page_bounds(None, None), (1, 10, 0));
        assert_eq!(page_bounds(Some(3), Some(20)), (3, 20, 40));
        assert_eq!(page_bounds(Some(0), Some(1000)), (1, 100, 0));
        assert_eq!(page_bounds(Some(2), Some(0)), (2, 1, 1));
    }

    #[test]
    fn huge_page_numbers_are_capped() {
        let (page, per_page, offset) = page_bounds(Some(u64::MAX), Some(100));
        assert_eq!(page, u32::MAX);
        assert_eq!(per_page, 100);
        assert_eq!(offset, u64::from(u32::MAX - 1) * 100);

        assert_eq!(page_bounds(Some(u64::from(u32::MAX) + 1), None).0, u32::MAX);
    }

    #[test]
    fn location_needs_both_coordinates() {
        assert_eq!(build_location(Some(23.8), None, Some(5.0)), Ok(None));
        assert_eq!(build_location(None, None, None), Ok(None));

        let loc = build_location(Some(23.8), Some(90.4), None).unwrap().unwrap();
        assert_eq!(loc.latitude, 23.8);
        assert_eq!(loc.accuracy, None);
    }

    #[test]
    fn location_out_of_range_is_rejected() {
        assert!(build_location(Some(91.0), Some(0.0), None).is_err());
        assert!(build_location(Some(0.0), Some(-181.0), None).is_err());
        assert!(build_location(Some(0.0), Some(0.0), Some(-1.0)).is_err());
    }

    #[test]
    fn a_second_photo_part_is_refused() {
        let mut photo = PhotoField::default();
        photo.begin().unwrap();
        photo.push(b"first", 64).unwrap();

        let err = photo.begin().unwrap_err();
        assert!(matches!(err, CheckInError::InvalidPhoto(_)));
        assert_eq!(photo.into_bytes(), b"first");
    }

    #[test]
    fn photo_size_is_checked_across_chunks() {
        let mut photo = PhotoField::default();
        photo.begin().unwrap();
        photo.push(&[0; 6], 10).unwrap();

        assert!(matches!(
            photo.push(&[0; 5], 10),
            Err(CheckInError::InvalidPhoto(_))
        ));
        assert_eq!(photo.into_bytes().len(), 6);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
    }
}
