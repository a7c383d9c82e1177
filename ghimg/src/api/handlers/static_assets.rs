//! HTTP handler for the embedded upload page.

use axum::{
    body::Body,
    http::{StatusCode, Uri, header},
    response::IntoResponse,
};
use tracing::{debug, instrument};

use crate::static_assets;

/// Serve an embedded asset, `index.html` for `/`, 404 for anything else.
#[instrument]
pub async fn serve_embedded_asset(uri: Uri) -> impl IntoResponse {
    let mut path = uri.path().trim_start_matches('/');

    if path.is_empty() || path.ends_with('/') {
        path = "index.html";
    }

    match static_assets::Assets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, "no-cache".to_string()),
                ],
                Body::from(content.data.into_owned()),
            )
                .into_response()
        }
        None => {
            debug!("No embedded asset for {}", path);
            (StatusCode::NOT_FOUND, Body::empty()).into_response()
        }
    }
}
