//! HTTP-facing error taxonomy.
//!
//! Handlers return [`ApiError`], which renders as a JSON body of the form
//! `{ "success": false, "error": "<message>" }`. Upstream failures
//! (embedding service, vector index, language model, queue) are logged
//! with full detail but reach the client only as a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream failure in {service}: {detail}")]
    Upstream { service: &'static str, detail: String },
}

impl ApiError {
    /// Wrap an external-service failure, keeping the detail for logs only.
    pub fn upstream<E: std::fmt::Display>(service: &'static str, err: E) -> Self {
        ApiError::Upstream {
            service,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Upstream { service, detail } => {
                tracing::error!(service, %detail, "upstream call failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Request failed".to_string(),
                )
            }
        };

        let body = Json(json!({ "success": false, "error": message }));
        (status, body).into_response()
    }
}
