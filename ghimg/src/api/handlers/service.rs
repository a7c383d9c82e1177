//! Service endpoints: health, client configuration and credential verification.

use axum::{Json, extract::State, http::StatusCode};
use tracing::{instrument, warn};

use crate::{
    AppState,
    api::models::service::{ClientConfigResponse, HealthResponse, RepositorySummary, VerifyConfigResponse, human_size},
};

fn repository_summary(state: &AppState) -> RepositorySummary {
    let github = &state.config.github;
    RepositorySummary {
        username: github.owner.clone(),
        repository: github.repository.clone(),
        folder: github.folder.clone(),
    }
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "service",
    responses((status = 200, description = "Server is up", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        config: repository_summary(&state),
    })
}

/// Limits and target repository for the upload page
#[utoipa::path(
    get,
    path = "/config",
    tag = "service",
    responses((status = 200, description = "Client configuration", body = ClientConfigResponse))
)]
pub async fn client_config(State(state): State<AppState>) -> Json<ClientConfigResponse> {
    let summary = repository_summary(&state);
    let limits = state.uploader.limits();
    Json(ClientConfigResponse {
        username: summary.username,
        repository: summary.repository,
        folder: summary.folder,
        max_files: limits.max_files,
        max_size: human_size(limits.max_file_size),
        max_size_bytes: limits.max_file_size,
    })
}

/// Check that the configured repository exists and the token can see it
#[utoipa::path(
    get,
    path = "/verify-config",
    tag = "service",
    responses(
        (status = 200, description = "Repository reachable with the configured credentials", body = VerifyConfigResponse),
        (status = 400, description = "Repository missing or credentials rejected", body = VerifyConfigResponse),
    )
)]
#[instrument(skip_all)]
pub async fn verify_config(State(state): State<AppState>) -> (StatusCode, Json<VerifyConfigResponse>) {
    match state.store.describe().await {
        Ok(info) => (
            StatusCode::OK,
            Json(VerifyConfigResponse {
                success: true,
                message: "GitHub configuration is valid".to_string(),
                repo: Some(info.full_name),
                private: Some(info.private),
                error: None,
            }),
        ),
        Err(e) => {
            warn!("GitHub configuration check failed: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(VerifyConfigResponse {
                    success: false,
                    message: "GitHub configuration is invalid".to_string(),
                    repo: None,
                    private: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{MemoryStore, create_test_app, create_test_app_with_config, create_test_config};
    use serde_json::Value;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health() {
        let server = create_test_app(Arc::new(MemoryStore::new()));

        let response = server.get("/api/health").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "OK");
        assert_eq!(body["config"]["username"], "octocat");
        assert_eq!(body["config"]["repository"], "catalog");
        assert_eq!(body["config"]["folder"], "products");
    }

    #[tokio::test]
    async fn test_client_config_reflects_limits() {
        let mut config = create_test_config();
        config.uploads.max_files = 4;
        let server = create_test_app_with_config(config, Arc::new(MemoryStore::new()));

        let body: Value = server.get("/api/config").await.json();

        assert_eq!(body["maxFiles"], 4);
        assert_eq!(body["maxSize"], "5MB");
        assert_eq!(body["maxSizeBytes"], 5 * 1024 * 1024);
        assert_eq!(body["repository"], "catalog");
    }

    #[tokio::test]
    async fn test_verify_config_success() {
        let server = create_test_app(Arc::new(MemoryStore::new()));

        let response = server.get("/api/verify-config").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["repo"], "octocat/catalog");
        assert_eq!(body["private"], false);
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_verify_config_rejected_credentials() {
        let server = create_test_app(Arc::new(MemoryStore::new().reject_credentials("Bad credentials")));

        let response = server.get("/api/verify-config").await;

        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("Bad credentials"));
        assert!(body.get("repo").is_none());
    }
}
