//! OpenAPI documentation for the `/api` endpoints, rendered with Scalar at `/api/docs`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ghimg",
        description = "Upload images to a GitHub repository and get back their public URLs"
    ),
    servers(
        (url = "/api", description = "Upload API")
    ),
    paths(
        api::handlers::uploads::upload_multiple,
        api::handlers::uploads::upload_single,
        api::handlers::service::health,
        api::handlers::service::client_config,
        api::handlers::service::verify_config,
    ),
    components(
        schemas(
            api::models::uploads::BatchUploadResponse,
            api::models::uploads::UploadedImage,
            api::models::uploads::SingleUploadResponse,
            api::models::uploads::ImageUrls,
            api::models::service::HealthResponse,
            api::models::service::RepositorySummary,
            api::models::service::ClientConfigResponse,
            api::models::service::VerifyConfigResponse,
        )
    ),
    tags(
        (name = "uploads", description = "Store images in the repository"),
        (name = "service", description = "Health and configuration"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_upload_paths() {
        let doc = ApiDoc::openapi();

        assert!(doc.paths.paths.contains_key("/upload-multiple"));
        assert!(doc.paths.paths.contains_key("/upload"));
        assert!(doc.paths.paths.contains_key("/verify-config"));
        let schemas = doc.components.expect("components").schemas;
        assert!(schemas.contains_key("BatchUploadResponse"));
    }
}
