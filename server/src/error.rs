use core::fmt;

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure cases of the coordination core.
///
/// A `Storage` error aborts the operation before any in-memory state change
/// is committed, so the caller may safely retry the whole request.
/// `EmptyPool` is a normal operating condition: the user exists but their
/// one-time keys ran out and must be replenished by the owning client.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("No key bundle has been stored for this user")]
    BundleNotFound,
    #[error("No one-time keys available")]
    EmptyPool,
    #[error("Durable store operation failed: {0}")]
    Storage(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status_code: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code;
        (
            status_code,
            [(header::CONTENT_TYPE, "application/json")],
            Json(json!({"StatusCode": status_code.as_u16(), "Message": self.message})),
        )
            .into_response()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API Error {}: {}", self.status_code, self.message)
    }
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        let status_code = match error {
            CoreError::BundleNotFound | CoreError::EmptyPool => StatusCode::NOT_FOUND,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status_code,
            message: error.to_string(),
        }
    }
}
