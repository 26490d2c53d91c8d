//! API error type and its JSON rendering

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bizreport_billing::BillingError;
use bizreport_shared::StoreError;
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("Team not found")]
    TeamNotFound,

    #[error("Not found")]
    NotFound,

    #[error("{message}")]
    LimitExceeded {
        message: String,
        upgrade_url: Option<String>,
    },

    #[error("We couldn't process your report. Please try again.")]
    ExternalCallFailed,

    #[error("Upstream service error: {0}")]
    BadGateway(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden | ApiError::LimitExceeded { .. } => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::TeamNotFound | ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::ExternalCallFailed | ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_) | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code the UI branches on
    fn error_code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthenticated",
            ApiError::Forbidden => "forbidden",
            ApiError::Validation(_) => "invalid_request",
            ApiError::TeamNotFound => "team_not_found",
            ApiError::NotFound => "not_found",
            ApiError::LimitExceeded { .. } => "limit_exceeded",
            ApiError::ExternalCallFailed => "external_call_failed",
            ApiError::BadGateway(_) => "upstream_error",
            ApiError::NotConfigured(_) => "not_configured",
            ApiError::Database(_) | ApiError::Internal => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the logs
        let message = match &self {
            ApiError::Database(detail) => {
                tracing::error!(error = %detail, "Database error");
                "Internal server error".to_string()
            }
            ApiError::BadGateway(detail) => {
                tracing::warn!(error = %detail, "Upstream service error");
                "Upstream service error".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "error": self.error_code(),
            "message": message,
            "code": status.as_u16(),
        });
        if let ApiError::LimitExceeded {
            upgrade_url: Some(url),
            ..
        } = &self
        {
            body["upgrade_url"] = json!(url);
        }

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Database(e.to_string())
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::TeamNotFound(_) => ApiError::TeamNotFound,
            other => ApiError::Database(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InsufficientPermissions => ApiError::Forbidden,
            AuthError::Internal(detail) => ApiError::Database(detail),
            _ => ApiError::Unauthorized,
        }
    }
}
