//! Rust capture surface for a running `ghimg` server.
//!
//! An [`UploadSession`] owns everything a capture surface accumulates: the files currently
//! selected and the links of files already uploaded. The caller owns the session and hands it to
//! [`UploadClient::submit`], which posts the selection as one batch and records the returned
//! links back into it.
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use ghimg::client::{UploadClient, UploadSession, load_item};
//!
//! let client = UploadClient::new("http://localhost:3000".parse()?)?;
//! let mut session = UploadSession::new(client.fetch_limits().await?);
//! session.select(vec![load_item("photo.png").await?])?;
//!
//! let response = client.submit(&mut session).await?;
//! println!("{} uploaded, {:?}", response.uploaded, session.links());
//! # Ok(())
//! # }
//! ```

use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error as ThisError;
use tracing::{debug, instrument};
use url::Url;

use crate::{
    api::{
        handlers::uploads::BATCH_FIELD,
        models::{service::ClientConfigResponse, uploads::BatchUploadResponse},
    },
    upload::{UploadItem, UploadLimits, ValidationError, validate_batch},
};

#[derive(ThisError, Debug)]
pub enum ClientError {
    #[error("No images are selected")]
    EmptySelection,

    /// The server could not be reached or its answer could not be read
    #[error("could not reach upload server: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an error status
    #[error("upload server rejected the request ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
}

/// Files selected for the next batch plus the links of everything uploaded so far.
#[derive(Debug, Clone)]
pub struct UploadSession {
    limits: UploadLimits,
    selected: Vec<UploadItem>,
    uploaded_links: Vec<String>,
}

impl UploadSession {
    pub fn new(limits: UploadLimits) -> Self {
        Self {
            limits,
            selected: Vec::new(),
            uploaded_links: Vec::new(),
        }
    }

    /// Replace the selection with `items`, checked against the same rules the server applies.
    ///
    /// On error the previous selection is kept.
    pub fn select(&mut self, items: Vec<UploadItem>) -> Result<(), ValidationError> {
        validate_batch(&items, &self.limits)?;
        self.selected = items;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<UploadItem> {
        (index < self.selected.len()).then(|| self.selected.remove(index))
    }

    /// Drop the selection. Uploaded links are kept.
    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn selected(&self) -> &[UploadItem] {
        &self.selected
    }

    /// Raw URLs of every file uploaded through this session, oldest first
    pub fn links(&self) -> &[String] {
        &self.uploaded_links
    }

    fn record(&mut self, response: &BatchUploadResponse) {
        self.uploaded_links
            .extend(response.images.iter().map(|image| image.raw_url.clone()));
        self.selected.clear();
    }
}

#[derive(Debug, Deserialize)]
struct RejectionBody {
    error: String,
}

/// HTTP client for the upload API.
pub struct UploadClient {
    client: Client,
    base_url: Url,
}

impl UploadClient {
    pub fn new(mut base_url: Url) -> Result<Self, ClientError> {
        // Url::join replaces the last segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(concat!("ghimg-push/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Batch limits advertised by the server.
    pub async fn fetch_limits(&self) -> Result<UploadLimits, ClientError> {
        let url = self.base_url.join("api/config")?;
        let response = self.client.get(url).send().await?;
        let config: ClientConfigResponse = Self::check(response).await?.json().await?;

        Ok(UploadLimits {
            max_files: config.max_files,
            max_file_size: config.max_size_bytes,
            ..UploadLimits::default()
        })
    }

    /// Post the session's selection as one batch.
    ///
    /// On success the returned raw URLs are appended to the session's links and the selection is
    /// cleared, even when some files failed; those are reported in the response's `errors`. On
    /// error the session is left untouched so the caller can retry.
    #[instrument(skip_all, fields(items = session.selected().len()))]
    pub async fn submit(&self, session: &mut UploadSession) -> Result<BatchUploadResponse, ClientError> {
        if session.selected().is_empty() {
            return Err(ClientError::EmptySelection);
        }

        let mut form = Form::new();
        for item in session.selected() {
            let part = Part::bytes(item.bytes.to_vec())
                .file_name(item.original_name.clone())
                .mime_str(&item.mime_type)?;
            form = form.part(BATCH_FIELD, part);
        }

        let url = self.base_url.join("api/upload-multiple")?;
        debug!("Submitting batch to {}", url);
        let response = self.client.post(url).multipart(form).send().await?;
        let body: BatchUploadResponse = Self::check(response).await?.json().await?;

        session.record(&body);
        Ok(body)
    }

    /// Turn an error status into [`ClientError::Rejected`], using the server's `error` message
    /// when the body carries one.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<RejectionBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        Err(ClientError::Rejected { status, message })
    }
}

/// Read a local file into an [`UploadItem`], guessing its MIME type from the extension.
pub async fn load_item(path: impl AsRef<Path>) -> Result<UploadItem, ClientError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|source| ClientError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime_type = mime_guess::from_path(path).first_or_octet_stream();

    Ok(UploadItem::new(name, mime_type.essence_str(), bytes.into()))
}
