//! API error types and their HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, warn};
use serde_json::json;
use thiserror::Error;

use crate::error::GatewayError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(msg) => ApiError::Validation(msg),
            GatewayError::Conflict(msg) => ApiError::Conflict(msg),
            GatewayError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => {
                warn!(error = msg.as_str(); "API: validation error");
                (StatusCode::BAD_REQUEST, msg.clone())
            },
            ApiError::Conflict(msg) => {
                warn!(error = msg.as_str(); "API: conflict");
                (StatusCode::CONFLICT, msg.clone())
            },
            ApiError::NotFound(msg) => {
                warn!(error = msg.as_str(); "API: not found");
                (StatusCode::NOT_FOUND, msg.clone())
            },
            ApiError::Internal(msg) => {
                error!(error = msg.as_str(); "API: internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            },
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
