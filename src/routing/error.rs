use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Failures of the forwarding pipeline.
///
/// The response rendering never includes the error detail; it is logged
/// where the error is produced.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("invalid outbound endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream transport failure: {0}")]
    Transport(String),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
}

impl ForwardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ForwardError::PolicyViolation(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<reqwest::Error> for ForwardError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ForwardError::Timeout
        } else if e.is_body() || e.is_decode() {
            ForwardError::MalformedResponse(e.to_string())
        } else {
            ForwardError::Transport(e.to_string())
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = status.canonical_reason().unwrap_or("error");
        (
            status,
            [(header::CACHE_CONTROL, "no-cache")],
            body.to_string(),
        )
            .into_response()
    }
}
