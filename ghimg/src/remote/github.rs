//! Object store backed by the GitHub repository contents API.
//!
//! Each [`ObjectStore::put`] becomes one `PUT /repos/{owner}/{repo}/contents/{path}` call, which
//! GitHub turns into one commit on the configured branch.

use anyhow::Context;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use bytes::Bytes;
use reqwest::{Client, Response, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::{ObjectStore, RemoteError, RepositoryInfo, StoredObject};
use crate::config::GitHubConfig;

const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// The concrete implementation of [`ObjectStore`] over `reqwest`.
pub struct GitHubContents {
    client: Client,
    api_url: Url,
    owner: String,
    repository: String,
    branch: String,
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: ContentEntry,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    path: String,
    sha: Option<String>,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubErrorBody {
    message: String,
}

impl GitHubContents {
    pub fn new(config: &GitHubConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to create GitHub HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            owner: config.owner.clone(),
            repository: config.repository.clone(),
            branch: config.branch.clone(),
            token: config.token.clone(),
        })
    }

    /// Build `{api_url}/repos/{owner}/{repo}` followed by `extra` segments, percent-encoding each.
    fn repo_url<'a>(&self, extra: impl IntoIterator<Item = &'a str>) -> Result<Url, RemoteError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Decode(format!("GitHub API URL cannot be a base: {}", self.api_url)))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repository.as_str()])
            .extend(extra);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header(header::ACCEPT, GITHUB_MEDIA_TYPE)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION);

        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Turn a non-success response into [`RemoteError::Api`], preferring GitHub's own `message`.
async fn error_from_response(response: Response) -> RemoteError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<GitHubErrorBody>(&body) {
        Ok(parsed) => parsed.message,
        Err(_) if body.is_empty() => status.canonical_reason().unwrap_or("unknown error").to_string(),
        Err(_) => body,
    };
    RemoteError::Api { status, message }
}

#[async_trait]
impl ObjectStore for GitHubContents {
    #[instrument(skip(self, content, message), fields(size = content.len()), err)]
    async fn put(&self, path: &str, content: Bytes, message: &str) -> Result<StoredObject, RemoteError> {
        let url = self.repo_url(std::iter::once("contents").chain(path.split('/')))?;
        let body = PutContentsRequest {
            message,
            content: BASE64_STANDARD.encode(&content),
            branch: &self.branch,
        };

        debug!("Writing {} to {}", path, url);
        let response = self.authorize(self.client.put(url)).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body_text = response.text().await?;
        let parsed: PutContentsResponse =
            serde_json::from_str(&body_text).map_err(|e| RemoteError::Decode(format!("error decoding contents response: {e}")))?;

        Ok(StoredObject {
            path: parsed.content.path,
            sha: parsed.content.sha,
            html_url: parsed.content.html_url,
        })
    }

    #[instrument(skip(self), err)]
    async fn describe(&self) -> Result<RepositoryInfo, RemoteError> {
        let url = self.repo_url(std::iter::empty())?;
        let response = self.authorize(self.client.get(url)).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body_text = response.text().await?;
        serde_json::from_str(&body_text).map_err(|e| RemoteError::Decode(format!("error decoding repository response: {e}")))
    }
}
