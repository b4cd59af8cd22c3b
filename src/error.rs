use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("service not configured: {0}")]
    ServiceNotConfigured(String),

    #[error("invalid otp")]
    InvalidOtp,

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::StateConflict(_) => "state_conflict",
            AppError::ServiceNotConfigured(_) => "service_not_configured",
            AppError::InvalidOtp => "invalid_otp",
            AppError::UpstreamFailure(_) => "upstream_failure",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::InvalidOtp => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StateConflict(_) => StatusCode::CONFLICT,
            AppError::ServiceNotConfigured(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client as-is.
    pub fn message(&self) -> String {
        match self {
            AppError::InvalidInput(msg)
            | AppError::NotFound(msg)
            | AppError::StateConflict(msg)
            | AppError::ServiceNotConfigured(msg)
            | AppError::UpstreamFailure(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::InvalidOtp => "Invalid OTP".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message(),
            "kind": self.kind(),
        }));

        (self.status_code(), body).into_response()
    }
}
