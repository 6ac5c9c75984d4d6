//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pwa_core::CoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] pwa_proxy::ProxyError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Proxy(_) => (StatusCode::BAD_GATEWAY, "FETCH_FAILED"),
            ApiError::Core(e) => match e {
                CoreError::Proxy(_) => (StatusCode::BAD_GATEWAY, "FETCH_FAILED"),
                CoreError::InstallFailed { .. } | CoreError::PrecacheStatus { .. } => {
                    (StatusCode::BAD_GATEWAY, "INSTALL_FAILED")
                }
                CoreError::NotActive(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_ACTIVE"),
                CoreError::InvalidConfig(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INVALID_CONFIG")
                }
                CoreError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
                CoreError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION")
                }
            },
        };

        let body = axum::Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
