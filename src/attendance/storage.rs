use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::config::CloudinaryConfig;
use crate::model::attendance::PhotoRef;

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("object store timed out")]
    Timeout,

    #[error("object store unreachable: {0}")]
    Transport(String),

    #[error("object store returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The store answered but refused the operation.
    #[error("object store rejected the request: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorageError::Timeout
        } else {
            StorageError::Transport(err.to_string())
        }
    }
}

/// Blob storage for check-in photos.
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under a name derived from `name_hint`.
    fn upload(
        &self,
        bytes: Vec<u8>,
        name_hint: &str,
    ) -> impl Future<Output = Result<PhotoRef, StorageError>> + Send;

    /// Deletes a blob. A blob that is already gone counts as deleted.
    fn delete(&self, storage_id: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Bounds an object-store call; an elapsed timer becomes [`StorageError::Timeout`].
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, StorageError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(StorageError::Timeout))
}

/// How a failed delete should be treated by the sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry on the next sweep.
    Transient,
    /// Will never succeed; close the record and flag it.
    Permanent,
}

/// Explicit transient/permanent classification of delete failures.
///
/// Only statuses listed in `permanent_statuses` and outright rejections are
/// permanent; everything else is retried.
#[derive(Debug, Clone)]
pub struct ReclaimPolicy {
    pub permanent_statuses: Vec<u16>,
}

impl ReclaimPolicy {
    pub fn new(permanent_statuses: Vec<u16>) -> Self {
        Self { permanent_statuses }
    }

    pub fn classify(&self, err: &StorageError) -> FailureKind {
        match err {
            StorageError::Timeout | StorageError::Transport(_) => FailureKind::Transient,
            StorageError::Status { status, .. } if self.permanent_statuses.contains(status) => {
                FailureKind::Permanent
            }
            StorageError::Status { .. } => FailureKind::Transient,
            StorageError::Rejected(_) => FailureKind::Permanent,
        }
    }
}

/// Blob name for a check-in photo. Unique enough that two uploads of the
/// same employee never collide in practice.
pub fn object_name(employee_code: &str, at: DateTime<Utc>) -> String {
    let code: String = employee_code
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let nonce = uuid::Uuid::new_v4().to_simple().to_string();

    format!("employee-{}-{}-{}", code, at.timestamp_millis(), &nonce[..8])
}

// ---------------------------------------------------------------------------
// Cloudinary
// ---------------------------------------------------------------------------

const CLOUDINARY_API: &str = "https://api.cloudinary.com/v1_1";

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Signed Cloudinary image uploads and destroys.
pub struct CloudinaryStore {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig, timeout: Duration) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", CLOUDINARY_API, self.config.cloud_name, action)
    }

    fn sign(&self, params: &[(&str, &str)]) -> String {
        signature(params, &self.config.api_secret)
    }

    async fn status_error(response: reqwest::Response) -> StorageError {
        let status = response.status().as_u16();
        let body = response.bytes().await.unwrap_or_default();
        StorageError::Status {
            status,
            message: error_message(&body),
        }
    }
}

impl ObjectStore for CloudinaryStore {
    async fn upload(&self, bytes: Vec<u8>, name_hint: &str) -> Result<PhotoRef, StorageError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("folder", self.config.folder.as_str()),
            ("public_id", name_hint),
            ("timestamp", timestamp.as_str()),
        ]);

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(name_hint.to_string()))
            .text("folder", self.config.folder.clone())
            .text("public_id", name_hint.to_string())
            .text("timestamp", timestamp)
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let body: UploadResponse = response.json().await?;
        Ok(PhotoRef {
            url: body.secure_url,
            storage_id: body.public_id,
        })
    }

    async fn delete(&self, storage_id: &str) -> Result<(), StorageError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", storage_id), ("timestamp", timestamp.as_str())]);

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&[
                ("public_id", storage_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.config.api_key.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let body: DestroyResponse = response.json().await?;
        destroy_outcome(&body.result)
    }
}

/// Cloudinary answers a destroy with `result`; a blob that is already gone
/// is as good as deleted.
fn destroy_outcome(result: &str) -> Result<(), StorageError> {
    match result {
        "ok" | "not found" => Ok(()),
        other => Err(StorageError::Rejected(other.to_string())),
    }
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| "no error details".to_string())
}

/// `key=value` pairs sorted by key and joined with `&`.
fn string_to_sign(params: &[(&str, &str)]) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn signature(params: &[(&str, &str)], secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(string_to_sign(params).as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
