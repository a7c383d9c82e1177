use crate::remote::RemoteError;
use crate::upload::{UploadError, ValidationError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Request body or a file in it exceeds a configured limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// Batch rejected before any remote write
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The object store failed a request that cannot be reported per item
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Validation(ValidationError::FileTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Remote(_) => StatusCode::BAD_GATEWAY,
            Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } | Error::PayloadTooLarge { message } => message.clone(),
            Error::Validation(e) => e.to_string(),
            Error::Remote(_) => "Failed to upload image".to_string(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }

    /// Extra context safe to show the caller.
    fn details(&self) -> Option<String> {
        match self {
            Error::Remote(e) => Some(e.to_string()),
            _ => None,
        }
    }
}

impl From<UploadError> for Error {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Validation(e) => Error::Validation(e),
            UploadError::Remote(e) => Error::Remote(e),
            UploadError::Task(e) => Error::Other(anyhow::Error::new(e).context("upload task failed")),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Remote(_) => {
                tracing::warn!("Object store error: {}", self);
            }
            Error::BadRequest { .. } | Error::PayloadTooLarge { .. } | Error::Validation(_) => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ErrorBody {
            success: false,
            error: self.user_message(),
            details: self.details(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
