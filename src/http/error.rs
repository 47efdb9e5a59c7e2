//! API error → HTTP response mapping (spec §4.10: JSON `{error}`, 500 for
//! general failures, 400 for missing path segments).

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Internal(String),
    BadRequest(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<crate::error::DeckError> for ApiError {
    fn from(e: crate::error::DeckError) -> Self {
        // Every `DeckError` kind, including `InvalidFilter`, maps to 500 here.
        // `BadRequest` is reserved for handlers that detect a missing path
        // segment themselves, which never flows through this impl.
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        tracing::error!(%status, %message, "API error");
        (status, Json(json!({ "error": message }))).into_response()
    }
}
