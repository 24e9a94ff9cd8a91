use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::config::ConfigError;
use crate::proxy::TransportError;
use crate::routing::ForwardError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("payload too large: limit is {0} bytes")]
    PayloadTooLarge(usize),
    #[error(transparent)]
    Forward(#[from] ForwardError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Forward(e) => e.status_code(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::Forward(ForwardError::PolicyViolation(_)) => "FORBIDDEN",
            ApiError::Forward(_) => "GATEWAY_TIMEOUT",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if let ApiError::Forward(e) = self {
            return e.into_response();
        }

        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (
            status,
            [(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))],
            Json(body),
        )
            .into_response()
    }
}

/// Failures while assembling the application at startup
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
