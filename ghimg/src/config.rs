//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `GHIMG_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `GHIMG_` override YAML values
//! 3. **GitHub variables** - `GITHUB_TOKEN`, `GITHUB_USERNAME` and `GITHUB_REPO` override
//!    `github.token`, `github.owner` and `github.repository`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `GHIMG_UPLOADS__MAX_FILES=5` sets the `uploads.max_files` field.
//!
//! ## Example
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 3000
//! github:
//!   owner: octocat
//!   repository: product-images
//!   branch: main
//!   folder: products
//!   request_timeout: 60s
//! uploads:
//!   max_files: 10
//!   max_file_size: 5242880
//!   file_prefix: product
//! cors:
//!   allowed_origins:
//!     - http://localhost:3000
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! GHIMG_PORT=8080
//!
//! # Token for the GitHub contents API (never put this in the YAML file)
//! GITHUB_TOKEN=ghp_xxx
//!
//! # Override nested values
//! GHIMG_GITHUB__BRANCH=gh-pages
//! GHIMG_UPLOADS__MAX_FILE_SIZE=1048576
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;
use crate::remote::RepositoryLocation;
use crate::upload::UploadLimits;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "GHIMG_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Target repository and GitHub API settings
    pub github: GitHubConfig,
    /// Batch shape and per-file limits
    pub uploads: UploadsConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

/// GitHub repository used as the object store.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubConfig {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub repository: String,
    /// Branch commits are written to
    pub branch: String,
    /// Folder inside the repository that receives uploads, without leading or trailing slash
    pub folder: String,
    /// Personal access token with `contents: write` on the repository
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Base URL of the GitHub REST API
    pub api_url: Url,
    /// User-Agent header sent to GitHub (required by the API)
    pub user_agent: String,
    /// Transport-level timeout for a single GitHub API call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Commit message template; `{name}` is replaced with the original file name
    pub commit_message: String,
}

// The token must never end up in logs.
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("owner", &self.owner)
            .field("repository", &self.repository)
            .field("branch", &self.branch)
            .field("folder", &self.folder)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url.as_str())
            .field("user_agent", &self.user_agent)
            .field("request_timeout", &self.request_timeout)
            .field("commit_message", &self.commit_message)
            .finish()
    }
}

impl GitHubConfig {
    /// The owner/repository/branch/folder tuple public URLs are derived from.
    pub fn location(&self) -> RepositoryLocation {
        RepositoryLocation {
            owner: self.owner.clone(),
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            folder: self.folder.clone(),
        }
    }
}

/// Upload batch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Maximum number of files accepted in one batch (default: 10)
    pub max_files: usize,
    /// Maximum size of a single file in bytes (default: 5 MiB)
    pub max_file_size: u64,
    /// Prefix of every derived file name (default: "product")
    pub file_prefix: String,
    /// Deadline for one remote write; expiry fails only that item
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
}

impl UploadsConfig {
    pub fn limits(&self) -> UploadLimits {
        UploadLimits {
            max_files: self.max_files,
            max_file_size: self.max_file_size,
            file_prefix: self.file_prefix.clone(),
        }
    }

    /// Largest request body a full batch can produce, plus room for multipart framing.
    pub fn body_limit(&self) -> usize {
        const MULTIPART_OVERHEAD: u64 = 1024 * 1024;
        let limit = self.max_file_size.saturating_mul(self.max_files as u64).saturating_add(MULTIPART_OVERHEAD);
        usize::try_from(limit).unwrap_or(usize::MAX)
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://shop.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl CorsOrigin {
    /// Header value form of the origin. `Url` serializes with a trailing slash, which browsers
    /// never send in the `Origin` header.
    pub fn as_header_str(&self) -> String {
        match self {
            CorsOrigin::Wildcard => "*".to_string(),
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            enable_otel_export: false,
            enable_metrics: false,
            github: GitHubConfig::default(),
            uploads: UploadsConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            owner: "proayham11".to_string(),
            repository: "avenir-images".to_string(),
            branch: "main".to_string(),
            folder: "products".to_string(),
            token: None,
            api_url: Url::parse("https://api.github.com").expect("static URL is valid"),
            user_agent: concat!("ghimg/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(60),
            commit_message: "Upload product image: {name}".to_string(),
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_file_size: 5 * 1024 * 1024, // 5 MiB
            file_prefix: "product".to_string(),
            write_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                CorsOrigin::Url(Url::parse("http://localhost:3000").expect("static URL is valid")),
                CorsOrigin::Url(Url::parse("http://127.0.0.1:5500").expect("static URL is valid")), // Live Server
            ],
            allow_credentials: true,
            max_age: Some(3600),
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let github = &self.github;
        for (field, value) in [
            ("github.owner", &github.owner),
            ("github.repository", &github.repository),
            ("github.branch", &github.branch),
            ("github.folder", &github.folder),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Internal {
                    operation: format!("Config validation: {field} cannot be empty"),
                });
            }
        }

        if github.folder.starts_with('/') || github.folder.ends_with('/') {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: github.folder ({}) must not start or end with '/'",
                    github.folder
                ),
            });
        }

        if github.request_timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: github.request_timeout must be greater than zero".to_string(),
            });
        }

        if self.uploads.max_files == 0 {
            return Err(Error::Internal {
                operation: "Config validation: uploads.max_files must be at least 1".to_string(),
            });
        }

        if self.uploads.max_file_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: uploads.max_file_size must be at least 1 byte".to_string(),
            });
        }

        if self.uploads.file_prefix.is_empty() || self.uploads.file_prefix.contains('/') {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: uploads.file_prefix ({:?}) must be non-empty and must not contain '/'",
                    self.uploads.file_prefix
                ),
            });
        }

        if self.uploads.write_timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: uploads.write_timeout must be greater than zero".to_string(),
            });
        }

        // The transport timeout would cut the write off first and the per-write limit never fires
        if self.uploads.write_timeout > self.github.request_timeout {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: uploads.write_timeout ({}) must not exceed github.request_timeout ({})",
                    humantime::format_duration(self.uploads.write_timeout),
                    humantime::format_duration(self.github.request_timeout)
                ),
            });
        }

        // Validate CORS configuration
        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        let has_wildcard = self.cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allow_credentials {
            return Err(Error::Internal {
                operation: "Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins."
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("GHIMG_").ignore(&["CONFIG", "SERVER"]).split("__"))
            // Unprefixed variables used by existing .env deployments
            .merge(Env::raw().only(&["GITHUB_TOKEN"]).map(|_| "github.token".into()))
            .merge(Env::raw().only(&["GITHUB_USERNAME"]).map(|_| "github.owner".into()))
            .merge(Env::raw().only(&["GITHUB_REPO"]).map(|_| "github.repository".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
