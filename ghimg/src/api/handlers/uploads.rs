//! Upload endpoints.
//!
//! Multipart bodies are streamed field by field; a request is abandoned as soon as a file grows
//! past the size limit or the file count passes the batch limit, so oversized batches are never
//! fully buffered.

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use bytes::BytesMut;
use tracing::{debug, instrument};

use crate::{
    AppState,
    api::models::uploads::{BatchUploadResponse, SingleUploadResponse},
    errors::{Error, Result},
    upload::{UploadItem, UploadLimits, ValidationError},
};

/// Multipart field carrying the files of a batch
pub const BATCH_FIELD: &str = "images";
/// Multipart field carrying the file of a single upload
pub const SINGLE_FIELD: &str = "image";

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge {
            message: "Request body is too large".to_string(),
        }
    } else {
        Error::BadRequest {
            message: format!("Failed to parse multipart data: {}", e.body_text()),
        }
    }
}

/// MIME type of a part: the declared content type, or a guess from the file name when the
/// browser sent none or a generic one.
fn mime_type_for(declared: Option<&str>, file_name: &str) -> String {
    match declared {
        Some(mime) if !mime.is_empty() && mime != "application/octet-stream" => mime.to_string(),
        _ => mime_guess::from_path(file_name).first_or_octet_stream().essence_str().to_string(),
    }
}

/// Read every `field_name` part of `multipart` into memory, enforcing `limits` as bytes arrive.
///
/// Other fields are skipped. The batch-level checks (empty batch, mime types) are left to the
/// orchestrator so they report the same way for every caller.
async fn read_images(multipart: &mut Multipart, field_name: &str, limits: &UploadLimits) -> Result<Vec<UploadItem>> {
    let mut items = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(field_name) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        if items.len() == limits.max_files {
            return Err(ValidationError::TooManyFiles {
                count: items.len() + 1,
                max: limits.max_files,
            }
            .into());
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let mime_type = mime_type_for(field.content_type(), &file_name);

        let mut buffer = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            // Fail fast rather than buffering the rest of an oversized file
            if (buffer.len() + chunk.len()) as u64 > limits.max_file_size {
                return Err(ValidationError::FileTooLarge {
                    file_name,
                    size: (buffer.len() + chunk.len()) as u64,
                    max: limits.max_file_size,
                }
                .into());
            }
            buffer.extend_from_slice(&chunk);
        }

        debug!(file_name = %file_name, size = buffer.len(), mime_type = %mime_type, "Received file");
        items.push(UploadItem::new(file_name, mime_type, buffer.freeze()));
    }

    Ok(items)
}

/// Upload a batch of images
///
/// Every file is written to the repository concurrently. Individual write failures do not fail
/// the request: they are listed in `errors` while the stored files are listed in `images`.
#[utoipa::path(
    post,
    path = "/upload-multiple",
    tag = "uploads",
    request_body(
        content_type = "multipart/form-data",
        description = "Up to `maxFiles` image files in the `images` field"
    ),
    responses(
        (status = 200, description = "Batch settled; see `failed` and `errors` for per-file failures", body = BatchUploadResponse),
        (status = 400, description = "No files, too many files, or a file that is not an image"),
        (status = 413, description = "A file exceeds the size limit"),
    )
)]
#[instrument(skip_all)]
pub async fn upload_multiple(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<BatchUploadResponse>> {
    let items = read_images(&mut multipart, BATCH_FIELD, state.uploader.limits()).await?;
    let result = state.uploader.upload(items).await?;
    Ok(Json(result.into()))
}

/// Upload a single image
#[utoipa::path(
    post,
    path = "/upload",
    tag = "uploads",
    request_body(
        content_type = "multipart/form-data",
        description = "One image file in the `image` field"
    ),
    responses(
        (status = 200, description = "Image stored", body = SingleUploadResponse),
        (status = 400, description = "No file, or the file is not an image"),
        (status = 413, description = "The file exceeds the size limit"),
        (status = 502, description = "The repository rejected the write"),
    )
)]
#[instrument(skip_all)]
pub async fn upload_single(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<SingleUploadResponse>> {
    let limits = UploadLimits {
        max_files: 1,
        ..state.uploader.limits().clone()
    };
    let mut items = read_images(&mut multipart, SINGLE_FIELD, &limits).await?;
    let item = items.pop().ok_or(Error::BadRequest {
        message: ValidationError::EmptyBatch.to_string(),
    })?;

    let stored = state.uploader.upload_one(item).await?;
    Ok(Json(stored.into()))
}
