//! Test utilities: an in-memory object store and app/config builders.

use async_trait::async_trait;
use axum_test::TestServer;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use crate::config::Config;
use crate::remote::{ObjectStore, RemoteError, RepositoryInfo, RepositoryLocation, StoredObject};
use crate::upload::UploadItem;

static CRYPTO_PROVIDER: Once = Once::new();

/// reqwest is built with `rustls-no-provider`, so every test that builds a client needs this.
pub fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// One recorded `put`.
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub path: String,
    pub message: String,
    pub size: usize,
}

enum Behavior {
    Fail(String),
    Stall,
}

/// [`ObjectStore`] that keeps writes in memory.
///
/// Items are matched by original name through the commit message, which always ends with
/// `": {name}"` under the test template.
#[derive(Default)]
pub struct MemoryStore {
    behaviors: HashMap<String, Behavior>,
    delay: Option<Duration>,
    describe_error: Option<String>,
    writes: Mutex<Vec<RecordedWrite>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail writes of `name` with an API error carrying `message`.
    pub fn fail_for(mut self, name: &str, message: &str) -> Self {
        self.behaviors.insert(name.to_string(), Behavior::Fail(message.to_string()));
        self
    }

    /// Never complete writes of `name`.
    pub fn stall_for(mut self, name: &str) -> Self {
        self.behaviors.insert(name.to_string(), Behavior::Stall);
        self
    }

    /// Sleep this long inside every write.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make `describe` fail with an unauthorized API error.
    pub fn reject_credentials(mut self, message: &str) -> Self {
        self.describe_error = Some(message.to_string());
        self
    }

    pub fn put_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }

    /// Writes that ran to the end, successfully or not
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, message: &str) -> Option<&Behavior> {
        self.behaviors
            .iter()
            .find(|(name, _)| message.ends_with(&format!(": {name}")))
            .map(|(_, behavior)| behavior)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, path: &str, content: Bytes, message: &str) -> Result<StoredObject, RemoteError> {
        self.writes.lock().unwrap().push(RecordedWrite {
            path: path.to_string(),
            message: message.to_string(),
            size: content.len(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = match self.behavior_for(message) {
            Some(Behavior::Stall) => std::future::pending().await,
            Some(Behavior::Fail(message)) => Err(RemoteError::Api {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                message: message.clone(),
            }),
            None => Ok(StoredObject {
                path: path.to_string(),
                sha: Some(format!("{:040x}", content.len())),
                html_url: Some(format!("https://github.com/octocat/catalog/blob/main/{path}")),
            }),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn describe(&self) -> Result<RepositoryInfo, RemoteError> {
        match &self.describe_error {
            Some(message) => Err(RemoteError::Api {
                status: reqwest::StatusCode::UNAUTHORIZED,
                message: message.clone(),
            }),
            None => Ok(RepositoryInfo {
                full_name: "octocat/catalog".to_string(),
                private: false,
            }),
        }
    }
}

/// An in-memory PNG-typed item of `size` bytes.
pub fn png_item(name: &str, size: usize) -> UploadItem {
    UploadItem::new(name, "image/png", Bytes::from(vec![0u8; size]))
}

pub fn test_location() -> RepositoryLocation {
    RepositoryLocation {
        owner: "octocat".to_string(),
        repository: "catalog".to_string(),
        branch: "main".to_string(),
        folder: "products".to_string(),
    }
}

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.github.owner = "octocat".to_string();
    config.github.repository = "catalog".to_string();
    config.github.token = Some("ghp_test".to_string());
    config.uploads.write_timeout = Duration::from_millis(500);
    config
}

/// Build a test server over `store` with the test configuration.
pub fn create_test_app(store: Arc<MemoryStore>) -> TestServer {
    create_test_app_with_config(create_test_config(), store)
}

pub fn create_test_app_with_config(config: Config, store: Arc<MemoryStore>) -> TestServer {
    crate::Application::with_store(config, store)
        .expect("Failed to create application")
        .into_test_server()
}
