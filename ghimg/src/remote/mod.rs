//! Remote object storage.
//!
//! Uploaded images are stored in a GitHub repository, one commit per file. The rest of the crate
//! only sees the [`ObjectStore`] trait: the orchestrator hands it a path, the file bytes and a
//! commit message, and gets back a [`StoredObject`] or a [`RemoteError`]. See [`github`] for the
//! implementation backed by the GitHub contents API.

pub mod github;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error as ThisError;
use url::Url;

pub use github::GitHubContents;

/// Failure writing to, or reading from, the object store.
///
/// Always scoped to a single object: the orchestrator folds these into the batch result rather
/// than failing the whole batch.
#[derive(ThisError, Debug)]
pub enum RemoteError {
    /// The request never produced a response (DNS, connect, TLS, client timeout)
    #[error("request to object store failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store answered with a non-success status
    #[error("object store returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    /// The store answered with a body we could not understand
    #[error("unexpected response from object store: {0}")]
    Decode(String),

    /// The write did not settle before the per-write deadline
    #[error("write timed out after {}", humantime::format_duration(*after))]
    Timeout { after: Duration },
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Path of the object inside the repository
    pub path: String,
    /// Blob SHA assigned by the store, if reported
    pub sha: Option<String>,
    /// Browser URL of the object on github.com, if reported
    pub html_url: Option<String>,
}

/// Basic facts about the target repository, used to verify credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub full_name: String,
    pub private: bool,
}

/// Durable, URL-addressable storage for uploaded files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the object at `path` with `content`, recorded under `message`.
    async fn put(&self, path: &str, content: Bytes, message: &str) -> Result<StoredObject, RemoteError>;

    /// Fetch repository metadata; fails when the repository is missing or the credentials are
    /// not accepted.
    async fn describe(&self) -> Result<RepositoryInfo, RemoteError>;
}

/// Where uploads land, and therefore what their public URLs look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocation {
    pub owner: String,
    pub repository: String,
    pub branch: String,
    pub folder: String,
}

impl RepositoryLocation {
    /// `raw.githubusercontent.com` URL of a repository path.
    pub fn raw_url(&self, path: &str) -> String {
        let segments = [self.owner.as_str(), self.repository.as_str()]
            .into_iter()
            .chain(self.branch.split('/'))
            .chain(path.split('/'));
        format!("https://raw.githubusercontent.com{}", encode_path(segments))
    }

    /// GitHub Pages URL of a repository path. Only resolves when Pages is enabled for the branch.
    pub fn pages_url(&self, path: &str) -> String {
        let segments = std::iter::once(self.repository.as_str()).chain(path.split('/'));
        format!("https://{}.github.io{}", self.owner, encode_path(segments))
    }

    /// Full repository path of a file name inside the upload folder.
    pub fn path_in_folder(&self, file_name: &str) -> String {
        format!("{}/{}", self.folder, file_name)
    }
}

/// Join `segments` into an absolute URL path, percent-encoding each one.
fn encode_path<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let mut url = Url::parse("https://raw.githubusercontent.com/").expect("constant URL is valid");
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url.path().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> RepositoryLocation {
        RepositoryLocation {
            owner: "octocat".to_string(),
            repository: "catalog".to_string(),
            branch: "main".to_string(),
            folder: "products".to_string(),
        }
    }

    #[test]
    fn test_raw_url_format() {
        let location = location();
        let path = location.path_in_folder("product_1700000000000_abc123xyz.png");

        assert_eq!(
            location.raw_url(&path),
            "https://raw.githubusercontent.com/octocat/catalog/main/products/product_1700000000000_abc123xyz.png"
        );
    }

    #[test]
    fn test_pages_url_format() {
        let location = location();
        assert_eq!(
            location.pages_url("products/a.png"),
            "https://octocat.github.io/catalog/products/a.png"
        );
    }

    #[test]
    fn test_urls_encode_reserved_characters_in_path() {
        let location = location();
        let path = location.path_in_folder("product_1_abc.my pic#1?.png");

        assert_eq!(
            location.raw_url(&path),
            "https://raw.githubusercontent.com/octocat/catalog/main/products/product_1_abc.my%20pic%231%3F.png"
        );
        assert_eq!(
            location.pages_url(&path),
            "https://octocat.github.io/catalog/products/product_1_abc.my%20pic%231%3F.png"
        );
    }

    #[test]
    fn test_branch_with_slash_keeps_its_segments() {
        let mut location = location();
        location.branch = "release/v2".to_string();

        assert_eq!(
            location.raw_url("products/a.png"),
            "https://raw.githubusercontent.com/octocat/catalog/release/v2/products/a.png"
        );
    }

    #[test]
    fn test_timeout_message_is_human_readable() {
        let err = RemoteError::Timeout {
            after: Duration::from_secs(90),
        };
        assert_eq!(err.to_string(), "write timed out after 1m 30s");
    }
}
