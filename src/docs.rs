use crate::api::attendance::{
    AttendanceListResponse, AttendanceStats, CheckInResponse, CheckInStatus, CheckInUpload,
    HistoryQuery, RecordFilter,
};
use crate::attendance::SweepReport;
use crate::model::attendance::{AttendanceRecord, EmployeeSnapshot, Location, PhotoRef};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance API",
        version = "1.0.0",
        description = r#"
## Daily attendance with photo check-in

Employees check in once per calendar day with a selfie and, optionally,
their location. HR and administrators review the records.

### 🔹 Key Features
- **Check-in** (one per employee per day, enforced by the database)
- **History and status** for the signed-in employee
- **Record search** with date range and text filters for HR/Admin
- **Photo retention**: photos are deleted after the retention window,
  records are kept for audit

### 🔐 Security
All endpoints require a **JWT Bearer** access token.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::check_in,
        crate::api::attendance::check_in_status,
        crate::api::attendance::history,
        crate::api::attendance::list_records,
        crate::api::attendance::stats,
        crate::api::attendance::run_sweep
    ),
    components(
        schemas(
            AttendanceRecord,
            EmployeeSnapshot,
            PhotoRef,
            Location,
            CheckInUpload,
            CheckInResponse,
            CheckInStatus,
            AttendanceListResponse,
            AttendanceStats,
            HistoryQuery,
            RecordFilter,
            SweepReport
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Check-in and photo retention APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
