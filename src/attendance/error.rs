use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

use super::{storage::StorageError, store::StoreError};

/// Why a check-in was not recorded.
#[derive(Debug, Error)]
pub enum CheckInError {
    #[error("You have already checked in today")]
    AlreadyCheckedIn,

    #[error("Invalid photo: {0}")]
    InvalidPhoto(String),

    #[error("Photo storage is unavailable, please try again")]
    StorageUnavailable(#[source] StorageError),

    #[error("Failed to record attendance")]
    PersistenceFailed(#[source] StoreError),
}

impl CheckInError {
    /// Stable machine-readable code for clients deciding whether to retry.
    pub fn code(&self) -> &'static str {
        match self {
            CheckInError::AlreadyCheckedIn => "already_checked_in",
            CheckInError::InvalidPhoto(_) => "invalid_photo",
            CheckInError::StorageUnavailable(_) => "storage_unavailable",
            CheckInError::PersistenceFailed(_) => "persistence_failed",
        }
    }
}

impl ResponseError for CheckInError {
    fn status_code(&self) -> StatusCode {
        match self {
            CheckInError::AlreadyCheckedIn => StatusCode::CONFLICT,
            CheckInError::InvalidPhoto(_) => StatusCode::BAD_REQUEST,
            CheckInError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CheckInError::PersistenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "message": self.to_string(),
            "code": self.code(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_kind_maps_to_a_distinct_status() {
        let errors = [
            CheckInError::AlreadyCheckedIn,
            CheckInError::InvalidPhoto("empty".into()),
            CheckInError::StorageUnavailable(StorageError::Timeout),
            CheckInError::PersistenceFailed(StoreError::Database(sqlx::Error::PoolClosed)),
        ];

        let mut statuses: Vec<_> = errors.iter().map(|e| e.status_code()).collect();
        statuses.dedup();
        assert_eq!(statuses.len(), errors.len());
    }

    #[test]
    fn infrastructure_details_stay_out_of_the_message() {
        let err = CheckInError::PersistenceFailed(StoreError::Database(
            sqlx::Error::Protocol("mysql at 10.0.0.4 refused".into()),
        ));
        assert_eq!(err.to_string(), "Failed to record attendance");
        assert_eq!(err.code(), "persistence_failed");
    }
}
