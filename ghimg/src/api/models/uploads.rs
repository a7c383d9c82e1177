use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::upload::{BatchResult, StoredObjectRef};

/// One stored image in a batch response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    /// Name of the file as submitted
    pub file_name: String,
    /// Public raw.githubusercontent.com URL
    pub raw_url: String,
    /// GitHub Pages URL (only resolves when Pages is enabled)
    pub pages_url: String,
    /// Size in bytes
    pub size: u64,
}

impl From<StoredObjectRef> for UploadedImage {
    fn from(stored: StoredObjectRef) -> Self {
        Self {
            file_name: stored.original_name,
            raw_url: stored.remote_url,
            pages_url: stored.pages_url,
            size: stored.size_bytes,
        }
    }
}

/// Response of `POST /api/upload-multiple`.
///
/// `success` is true whenever the batch passed validation, even if some or all writes failed;
/// `failed` and `errors` carry the per-file failures.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchUploadResponse {
    pub success: bool,
    pub total: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub images: Vec<UploadedImage>,
    pub errors: Vec<String>,
}

impl From<BatchResult> for BatchUploadResponse {
    fn from(result: BatchResult) -> Self {
        Self {
            success: true,
            total: result.total_requested,
            uploaded: result.succeeded.len(),
            failed: result.failed_count,
            images: result.succeeded.into_iter().map(UploadedImage::from).collect(),
            errors: result.failure_messages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageUrls {
    pub raw: String,
    pub pages: String,
    /// github.com page of the file
    pub github: Option<String>,
}

/// Response of `POST /api/upload`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SingleUploadResponse {
    pub success: bool,
    pub message: String,
    pub file_name: String,
    pub urls: ImageUrls,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
}

impl From<StoredObjectRef> for SingleUploadResponse {
    fn from(stored: StoredObjectRef) -> Self {
        Self {
            success: true,
            message: "Image uploaded successfully".to_string(),
            file_name: stored.original_name,
            urls: ImageUrls {
                raw: stored.remote_url,
                pages: stored.pages_url,
                github: stored.html_url,
            },
            size: stored.size_bytes,
            timestamp: Utc::now(),
        }
    }
}
