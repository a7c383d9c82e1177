//! # ghimg: image uploads backed by a GitHub repository
//!
//! `ghimg` accepts images from a browser (or the `ghimg-push` CLI), commits each one to a folder
//! of a GitHub repository through the contents API, and answers with the public
//! `raw.githubusercontent.com` URL of every stored file. The repository acts as durable,
//! URL-addressable storage: there is no database and no state beyond the repository itself.
//!
//! ## Request Flow
//!
//! A batch arrives at `POST /api/upload-multiple` as a multipart body. The handler streams the
//! `images` parts into memory, aborting as soon as a file or the file count passes its limit. The
//! [`upload::Uploader`] then validates the whole batch, derives a unique repository path per file,
//! issues every write to the [`remote::ObjectStore`] at once and folds the settled outcomes into a
//! single [`upload::BatchResult`]. One failing write never fails its siblings: the response is a
//! success carrying both the stored images and the per-file error messages. Only a batch that
//! fails validation is rejected, and in that case nothing has been written.
//!
//! ### Core Components
//!
//! - [`remote`]: the object store seam and its GitHub implementation ([`remote::GitHubContents`])
//! - [`upload`]: batch validation, path derivation and the concurrent fan-out
//! - [`api`]: axum handlers and their JSON models
//! - [`client`]: a Rust capture surface that drives the same endpoint over HTTP
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use ghimg::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = ghimg::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     ghimg::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     Application::new(config)?.serve(ghimg::shutdown_signal()).await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod client;
pub mod config;
pub mod errors;
mod openapi;
pub mod remote;
mod static_assets;
pub mod telemetry;
pub mod upload;

#[cfg(test)]
mod test_utils;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue, Method},
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;

use crate::{
    config::CorsOrigin,
    openapi::ApiDoc,
    remote::{GitHubContents, ObjectStore},
    upload::Uploader,
};

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .uploader(Arc::new(uploader))
///     .store(store)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub uploader: Arc<Uploader>,
    /// The store behind `uploader`, used directly for credential checks
    pub store: Arc<dyn ObjectStore>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    // `*` is only valid on its own; AllowOrigin::list rejects it
    let allow_origin = if config.cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            origins.push(origin.as_header_str().parse::<HeaderValue>()?);
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_credentials(config.cors.allow_credentials);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router.
///
/// - Upload, health and configuration routes under `/api`
/// - OpenAPI document at `/api/openapi.json`, Scalar UI at `/api/docs`
/// - Embedded upload page as the fallback
/// - Optional Prometheus metrics at `/internal/metrics`
/// - CORS and tracing middleware
///
/// # Errors
///
/// Returns an error if the CORS configuration is invalid.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/upload-multiple", post(api::handlers::uploads::upload_multiple))
        .route("/upload", post(api::handlers::uploads::upload_single))
        .route("/health", get(api::handlers::service::health))
        .route("/config", get(api::handlers::service::client_config))
        .route("/verify-config", get(api::handlers::service::verify_config))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        // A whole batch arrives in one body
        .layer(DefaultBodyLimit::max(state.config.uploads.body_limit()))
        .with_state(state.clone());

    let router = Router::new()
        .nest("/api", api_routes)
        .fallback(get(api::handlers::static_assets::serve_embedded_asset));

    let mut router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct owning the router and configuration.
///
/// 1. **Create**: [`Application::new`] builds the GitHub store, or [`Application::with_store`]
///    takes any [`ObjectStore`]
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create an application writing to the configured GitHub repository
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(GitHubContents::new(&config.github)?);
        Self::with_store(config, store)
    }

    /// Create an application writing to `store`
    pub fn with_store(config: Config, store: Arc<dyn ObjectStore>) -> anyhow::Result<Self> {
        debug!("Starting ghimg with configuration: {:#?}", config);

        let uploader = Uploader::new(
            store.clone(),
            config.github.location(),
            config.uploads.limits(),
            config.uploads.write_timeout,
            config.github.commit_message.clone(),
        );

        let app_state = AppState::builder()
            .config(config.clone())
            .uploader(Arc::new(uploader))
            .store(store)
            .build();

        let router = build_router(&app_state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "ghimg listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );
        info!(
            "Uploading to {}/{} ({} on {})",
            self.config.github.owner, self.config.github.repository, self.config.github.folder, self.config.github.branch
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
///
/// A signal whose handler cannot be installed is logged and never fires, so the other one still
/// works. Batches in flight when it resolves are drained by axum's graceful shutdown.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = ctrl_c => "Ctrl+C",
        _ = terminate => "SIGTERM",
    };
    info!("Received {}, finishing in-flight uploads before exit", received);
}
