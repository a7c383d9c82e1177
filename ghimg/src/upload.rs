//! Multi-file upload orchestration.
//!
//! An [`Uploader`] takes one batch of in-memory [`UploadItem`]s and:
//!
//! 1. validates the whole batch up front ([`validate_batch`]), so a bad file means nothing is
//!    written at all;
//! 2. derives a unique repository path per item ([`derive_file_name`]);
//! 3. issues every remote write at once and waits for all of them to settle, each under its own
//!    deadline;
//! 4. folds the outcomes into a [`BatchResult`], keeping successes in submission order.
//!
//! A failed write only fails its own item. The batch as a whole fails only on validation.

use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use rand::prelude::RngExt;
use rand::rng;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, instrument, warn};

use crate::remote::{ObjectStore, RemoteError, RepositoryLocation};

/// Alphabet of the random token in derived file names.
const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TOKEN_LEN: usize = 9;

/// A file accepted from the capture surface, held in memory until its batch completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub original_name: String,
    pub bytes: Bytes,
    pub size_bytes: u64,
    pub mime_type: String,
}

impl UploadItem {
    pub fn new(original_name: impl Into<String>, mime_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            original_name: original_name.into(),
            size_bytes: bytes.len() as u64,
            bytes,
            mime_type: mime_type.into(),
        }
    }
}

/// A successfully stored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObjectRef {
    pub original_name: String,
    /// Path inside the repository
    pub remote_path: String,
    /// Public `raw.githubusercontent.com` URL
    pub remote_url: String,
    /// GitHub Pages URL of the same path
    pub pages_url: String,
    /// github.com page of the file, when the store reported one
    pub html_url: Option<String>,
    pub size_bytes: u64,
}

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub total_requested: usize,
    /// Stored items, in submission order
    pub succeeded: Vec<StoredObjectRef>,
    pub failed_count: usize,
    /// One message per failed item, in submission order
    pub failure_messages: Vec<String>,
}

impl BatchResult {
    /// Partition settled writes. `outcomes` must be in submission order.
    fn from_outcomes(outcomes: Vec<Result<StoredObjectRef, String>>) -> Self {
        let total_requested = outcomes.len();
        let (succeeded, failure_messages): (Vec<_>, Vec<_>) = outcomes.into_iter().fold(
            (Vec::new(), Vec::new()),
            |(mut ok, mut failed), outcome| {
                match outcome {
                    Ok(stored) => ok.push(stored),
                    Err(message) => failed.push(message),
                }
                (ok, failed)
            },
        );

        Self {
            total_requested,
            failed_count: failure_messages.len(),
            succeeded,
            failure_messages,
        }
    }
}

/// Batch shape and per-file limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_size: u64,
    /// Leading part of every derived file name
    pub file_prefix: String,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_file_size: 5 * 1024 * 1024,
            file_prefix: "product".to_string(),
        }
    }
}

/// A batch rejected before any remote write.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No images were selected")]
    EmptyBatch,

    #[error("Too many files: {count} submitted, at most {max} allowed per batch")]
    TooManyFiles { count: usize, max: usize },

    #[error("File {file_name} is too large ({size} bytes, maximum {max} bytes)")]
    FileTooLarge { file_name: String, size: u64, max: u64 },

    #[error("File {file_name} is not an image ({mime_type})")]
    NotAnImage { file_name: String, mime_type: String },
}

/// Failure of a single-item upload.
#[derive(ThisError, Debug)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The write task panicked
    #[error("upload task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Check one item against the per-file limits.
pub fn validate_item(item: &UploadItem, limits: &UploadLimits) -> Result<(), ValidationError> {
    if item.size_bytes > limits.max_file_size {
        return Err(ValidationError::FileTooLarge {
            file_name: item.original_name.clone(),
            size: item.size_bytes,
            max: limits.max_file_size,
        });
    }

    if !item.mime_type.starts_with("image/") {
        return Err(ValidationError::NotAnImage {
            file_name: item.original_name.clone(),
            mime_type: item.mime_type.clone(),
        });
    }

    Ok(())
}

/// Check a whole batch. The first offending item rejects the batch.
pub fn validate_batch(items: &[UploadItem], limits: &UploadLimits) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }

    if items.len() > limits.max_files {
        return Err(ValidationError::TooManyFiles {
            count: items.len(),
            max: limits.max_files,
        });
    }

    items.iter().try_for_each(|item| validate_item(item, limits))
}

/// Extension of `original_name` including the leading dot, or an empty string.
///
/// Dot files such as `.png` have no extension, matching how browsers and Node treat them.
fn original_extension(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

fn random_token() -> String {
    let mut rng = rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Derive the stored file name `{prefix}_{now_millis}_{token}{ext}`.
///
/// The token is drawn independently on every call, so two items derived within the same
/// millisecond still get distinct names.
pub fn derive_file_name(prefix: &str, original_name: &str, now_millis: i64) -> String {
    format!(
        "{prefix}_{now_millis}_{token}{ext}",
        token = random_token(),
        ext = original_extension(original_name)
    )
}

/// Everything a single write needs, shared with the spawned write tasks.
struct WriteTarget {
    store: Arc<dyn ObjectStore>,
    location: RepositoryLocation,
    file_prefix: String,
    write_timeout: Duration,
    commit_message: String,
}

impl WriteTarget {
    /// Derive the path, write under the per-write deadline and build the public reference.
    async fn store_item(&self, item: UploadItem) -> Result<StoredObjectRef, RemoteError> {
        let file_name = derive_file_name(&self.file_prefix, &item.original_name, Utc::now().timestamp_millis());
        let path = self.location.path_in_folder(&file_name);
        let message = self.commit_message.replace("{name}", &item.original_name);

        let write = self.store.put(&path, item.bytes, &message);
        let stored = match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(stored)) => stored,
            Ok(Err(e)) => {
                warn!(file_name = %item.original_name, path = %path, error = %e, "Remote write failed");
                return Err(e);
            }
            Err(_) => {
                warn!(file_name = %item.original_name, path = %path, "Remote write timed out");
                return Err(RemoteError::Timeout {
                    after: self.write_timeout,
                });
            }
        };

        Ok(StoredObjectRef {
            remote_url: self.location.raw_url(&path),
            pages_url: self.location.pages_url(&path),
            html_url: stored.html_url,
            remote_path: path,
            original_name: item.original_name,
            size_bytes: item.size_bytes,
        })
    }
}

/// Runs batches against an [`ObjectStore`].
///
/// Every write runs on its own task. Dropping the future returned by [`Uploader::upload`] (a
/// client disconnecting mid-batch, say) stops waiting for the writes but does not cancel them:
/// each still completes or fails on its own, and nothing already committed is rolled back.
pub struct Uploader {
    target: Arc<WriteTarget>,
    limits: UploadLimits,
}

impl Uploader {
    /// `commit_message` is a template; `{name}` is replaced with each item's original name.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        location: RepositoryLocation,
        limits: UploadLimits,
        write_timeout: Duration,
        commit_message: impl Into<String>,
    ) -> Self {
        Self {
            target: Arc::new(WriteTarget {
                store,
                location,
                file_prefix: limits.file_prefix.clone(),
                write_timeout,
                commit_message: commit_message.into(),
            }),
            limits,
        }
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    pub fn location(&self) -> &RepositoryLocation {
        &self.target.location
    }

    /// Start the write of `item` on its own task.
    fn spawn_write(&self, item: UploadItem) -> JoinHandle<Result<StoredObjectRef, RemoteError>> {
        let target = Arc::clone(&self.target);
        tokio::spawn(async move { target.store_item(item).await }.in_current_span())
    }

    /// Upload a batch.
    ///
    /// Returns `Err` only when validation rejects the batch, in which case the store was never
    /// called. Remote failures are reported per item inside the [`BatchResult`].
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn upload(&self, items: Vec<UploadItem>) -> Result<BatchResult, ValidationError> {
        validate_batch(&items, &self.limits)?;

        let writes: Vec<_> = items
            .into_iter()
            .map(|item| (item.original_name.clone(), self.spawn_write(item)))
            .collect();

        // Handles are awaited in submission order, so outcomes keep that order
        let outcomes = join_all(writes.into_iter().map(|(name, handle)| async move {
            match handle.await {
                Ok(outcome) => outcome.map_err(|e| format!("{name}: {e}")),
                Err(e) => Err(format!("{name}: {e}")),
            }
        }))
        .await;
        let result = BatchResult::from_outcomes(outcomes);

        metrics::counter!("ghimg_uploads_total", "outcome" => "stored").increment(result.succeeded.len() as u64);
        metrics::counter!("ghimg_uploads_total", "outcome" => "failed").increment(result.failed_count as u64);

        info!(
            total = result.total_requested,
            uploaded = result.succeeded.len(),
            failed = result.failed_count,
            "Batch upload settled"
        );
        Ok(result)
    }

    /// Upload a single item, surfacing its remote failure directly.
    #[instrument(skip_all, fields(file_name = %item.original_name))]
    pub async fn upload_one(&self, item: UploadItem) -> Result<StoredObjectRef, UploadError> {
        validate_batch(std::slice::from_ref(&item), &self.limits)?;

        let outcome = self.spawn_write(item).await?;
        let label = if outcome.is_ok() { "stored" } else { "failed" };
        metrics::counter!("ghimg_uploads_total", "outcome" => label).increment(1);
        Ok(outcome?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MemoryStore, png_item, test_location};
    use std::collections::HashSet;

    fn uploader(store: Arc<MemoryStore>) -> Uploader {
        Uploader::new(
            store,
            test_location(),
            UploadLimits::default(),
            Duration::from_millis(200),
            "Upload product image: {name}",
        )
    }

    #[test]
    fn test_original_extension() {
        assert_eq!(original_extension("cat.png"), ".png");
        assert_eq!(original_extension("archive.tar.GZ"), ".GZ");
        assert_eq!(original_extension("README"), "");
        assert_eq!(original_extension(".png"), "");
    }

    #[test]
    fn test_derive_file_name_format() {
        let name = derive_file_name("product", "holiday photo.JPG", 1_700_000_000_123);

        let rest = name.strip_prefix("product_1700000000123_").expect("prefix and timestamp");
        let (token, ext) = rest.split_at(TOKEN_LEN);
        assert_eq!(ext, ".JPG");
        assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_derive_file_name_unique_within_same_millisecond() {
        let names: HashSet<_> = (0..1000).map(|_| derive_file_name("product", "a.png", 42)).collect();
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn test_validate_batch_rules() {
        let limits = UploadLimits::default();

        assert_eq!(validate_batch(&[], &limits), Err(ValidationError::EmptyBatch));

        let eleven: Vec<_> = (0..11).map(|i| png_item(&format!("{i}.png"), 1024)).collect();
        assert_eq!(
            validate_batch(&eleven, &limits),
            Err(ValidationError::TooManyFiles { count: 11, max: 10 })
        );

        let big = vec![png_item("ok.png", 10), png_item("big.png", 5 * 1024 * 1024 + 1)];
        assert_eq!(
            validate_batch(&big, &limits),
            Err(ValidationError::FileTooLarge {
                file_name: "big.png".to_string(),
                size: 5 * 1024 * 1024 + 1,
                max: 5 * 1024 * 1024,
            })
        );

        let pdf = vec![UploadItem::new("doc.pdf", "application/pdf", Bytes::from_static(b"%PDF"))];
        assert_eq!(
            validate_batch(&pdf, &limits),
            Err(ValidationError::NotAnImage {
                file_name: "doc.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
            })
        );

        let exact = vec![png_item("edge.png", 5 * 1024 * 1024)];
        assert!(validate_batch(&exact, &limits).is_ok());
    }

    #[tokio::test]
    async fn test_all_writes_succeed() {
        let store = Arc::new(MemoryStore::new());
        let items = vec![png_item("a.png", 1024), png_item("b.png", 1024), png_item("c.png", 1024)];

        let result = uploader(store.clone()).upload(items).await.unwrap();

        assert_eq!(result.total_requested, 3);
        assert_eq!(result.succeeded.len(), 3);
        assert_eq!(result.failed_count, 0);
        assert!(result.failure_messages.is_empty());
        assert_eq!(store.put_count(), 3);

        let names: Vec<_> = result.succeeded.iter().map(|s| s.original_name.as_str()).collect();
        assert_eq!(names, ["a.png", "b.png", "c.png"]);

        for stored in &result.succeeded {
            assert!(stored.remote_path.starts_with("products/product_"));
            assert!(stored.remote_path.ends_with(".png"));
            assert_eq!(
                stored.remote_url,
                format!("https://raw.githubusercontent.com/octocat/catalog/main/{}", stored.remote_path)
            );
            assert_eq!(stored.size_bytes, 1024);
        }

        let writes = store.writes();
        assert!(writes.iter().any(|w| w.message == "Upload product image: b.png"));
    }

    #[tokio::test]
    async fn test_partial_failure_is_folded_into_result() {
        let store = Arc::new(MemoryStore::new().fail_for("b.png", "network unreachable"));
        let items = vec![png_item("a.png", 10), png_item("b.png", 10), png_item("c.png", 10)];

        let result = uploader(store.clone()).upload(items).await.unwrap();

        assert_eq!(result.total_requested, 3);
        assert_eq!(result.succeeded.len(), 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.failure_messages.len(), 1);
        assert!(result.failure_messages[0].starts_with("b.png: "));
        assert!(result.failure_messages[0].contains("network unreachable"));
        assert_eq!(result.succeeded.len() + result.failed_count, result.total_requested);

        // The failing write did not stop its siblings
        assert_eq!(store.put_count(), 3);
        let names: Vec<_> = result.succeeded.iter().map(|s| s.original_name.as_str()).collect();
        assert_eq!(names, ["a.png", "c.png"]);
    }

    #[tokio::test]
    async fn test_every_write_failing_still_returns_result() {
        let store = Arc::new(MemoryStore::new().fail_for("a.png", "boom").fail_for("b.png", "boom"));
        let items = vec![png_item("a.png", 10), png_item("b.png", 10)];

        let result = uploader(store).upload(items).await.unwrap();

        assert!(result.succeeded.is_empty());
        assert_eq!(result.failed_count, 2);
        assert_eq!(result.failure_messages.len(), 2);
    }

    #[tokio::test]
    async fn test_too_many_files_never_reaches_store() {
        let store = Arc::new(MemoryStore::new());
        let items: Vec<_> = (0..11).map(|i| png_item(&format!("{i}.png"), 10)).collect();

        let err = uploader(store.clone()).upload(items).await.unwrap_err();

        assert_eq!(err, ValidationError::TooManyFiles { count: 11, max: 10 });
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_one_bad_item_rejects_whole_batch() {
        let store = Arc::new(MemoryStore::new());
        let items = vec![
            png_item("a.png", 10),
            UploadItem::new("notes.txt", "text/plain", Bytes::from_static(b"hi")),
        ];

        let err = uploader(store.clone()).upload(items).await.unwrap_err();

        assert!(matches!(err, ValidationError::NotAnImage { ref file_name, .. } if file_name == "notes.txt"));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_names_get_distinct_paths() {
        let store = Arc::new(MemoryStore::new());
        let items = vec![png_item("same.png", 10), png_item("same.png", 10)];

        let result = uploader(store.clone()).upload(items).await.unwrap();

        assert_eq!(result.succeeded.len(), 2);
        assert_ne!(result.succeeded[0].remote_path, result.succeeded[1].remote_path);
        let paths: HashSet<_> = store.writes().into_iter().map(|w| w.path).collect();
        assert_eq!(paths.len(), 2);
    }

    #[tokio::test]
    async fn test_writes_are_issued_concurrently() {
        // Five 100ms writes run back to back would take at least 500ms
        let store = Arc::new(MemoryStore::new().with_delay(Duration::from_millis(100)));
        let items: Vec<_> = (0..5).map(|i| png_item(&format!("{i}.png"), 10)).collect();

        let started = std::time::Instant::now();
        let result = uploader(store.clone()).upload(items).await.unwrap();

        assert_eq!(result.succeeded.len(), 5);
        assert!(started.elapsed() < Duration::from_millis(450));
        assert_eq!(store.max_in_flight(), 5);
    }

    #[tokio::test]
    async fn test_dropping_the_batch_does_not_cancel_writes() {
        let store = Arc::new(MemoryStore::new().with_delay(Duration::from_millis(150)));
        let items = vec![png_item("a.png", 10), png_item("b.png", 10), png_item("c.png", 10)];
        let uploader = uploader(store.clone());

        // Caller gives up long before the writes finish
        let abandoned = tokio::time::timeout(Duration::from_millis(30), uploader.upload(items)).await;
        assert!(abandoned.is_err());
        assert_eq!(store.completed_count(), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.completed_count(), 3);
    }

    #[tokio::test]
    async fn test_timed_out_write_fails_only_that_item() {
        let store = Arc::new(MemoryStore::new().stall_for("slow.png"));
        let items = vec![png_item("fast.png", 10), png_item("slow.png", 10)];

        let result = uploader(store).upload(items).await.unwrap();

        assert_eq!(result.succeeded.len(), 1);
        assert_eq!(result.succeeded[0].original_name, "fast.png");
        assert_eq!(result.failed_count, 1);
        assert!(result.failure_messages[0].starts_with("slow.png: write timed out after"));
    }

    #[tokio::test]
    async fn test_upload_one_surfaces_remote_error() {
        let store = Arc::new(MemoryStore::new().fail_for("a.png", "conflict"));

        let err = uploader(store).upload_one(png_item("a.png", 10)).await.unwrap_err();

        assert!(matches!(err, UploadError::Remote(_)));
    }

    #[tokio::test]
    async fn test_upload_one_validates() {
        let store = Arc::new(MemoryStore::new());

        let err = uploader(store.clone())
            .upload_one(UploadItem::new("a.gif", "video/mp4", Bytes::from_static(b"x")))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Validation(ValidationError::NotAnImage { .. })));
        assert_eq!(store.put_count(), 0);
    }
}
