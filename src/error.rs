use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::infrastructure::identity::IdentityErrorCode;
use crate::validation::ValidationErrors;

#[derive(Debug)]
pub enum AppError {
    DatabaseError(String),
    NotFound(String),
    BadRequest(String),
    Internal(String),
    Validation(String),
    /// Field-level form failures, raised before any store call
    InvalidForm(ValidationErrors),
    Identity(IdentityErrorCode),
    Storage(String),
    ConfigurationError(String),
    Unauthorized(String),
    Forbidden(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::InvalidForm(errors) => write!(f, "Validation error: {}", errors),
            AppError::Identity(code) => write!(f, "Identity error: {}", code.as_str()),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidForm(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                errors
                    .first_message()
                    .unwrap_or("Invalid form")
                    .to_string(),
            ),
            AppError::Identity(code) => {
                tracing::warn!("Identity error: {}", code.as_str());
                (code.status(), code.localized_message().to_string())
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::ConfigurationError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
        };

        let mut body = json!({
            "error": error_message,
            "status": status.as_u16()
        });
        match &self {
            AppError::Identity(code) => {
                body["code"] = json!(code.as_str());
            }
            AppError::InvalidForm(errors) => {
                body["fields"] = json!(errors.fields());
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

impl From<IdentityErrorCode> for AppError {
    fn from(code: IdentityErrorCode) -> Self {
        AppError::Identity(code)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::InvalidForm(errors)
    }
}

pub type AppResult<T> = Result<T, AppError>;
