use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use validator::ValidationErrors;

use crate::auth::RateWindow;

pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";
pub const AUTH_REQUIRED_ERROR: &str = "Authentication required to access this API";

/// JSON body shared by every error response: `{status, message, error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub status: u16,
    pub message: String,
    pub error: String,
}

impl ErrorEnvelope {
    pub fn new(status: StatusCode, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            error: error.into(),
        }
    }

    /// The envelope returned for any missing or rejected credential.
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, UNAUTHORIZED_MESSAGE, AUTH_REQUIRED_ERROR)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Counter store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationErrors),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::DatabaseError(DatabaseError::NotFound),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::DatabaseError(DatabaseError::Duplicate)
            }
            _ => AppError::DatabaseError(DatabaseError::QueryError(err.to_string())),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::DatabaseError(DatabaseError::MigrationError(err.to_string()))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::InternalError(format!("password hashing failed: {}", err))
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl AppError {
    fn envelope(&self) -> ErrorEnvelope {
        let status = self.status_code();
        match self {
            AppError::AuthError(e) => e.envelope(),
            AppError::ValidationError(detail) => {
                ErrorEnvelope::new(status, "Validation failed", detail.clone())
            }
            AppError::DatabaseError(DatabaseError::Duplicate) => {
                ErrorEnvelope::new(status, "Conflict", "Email already in use")
            }
            AppError::DatabaseError(DatabaseError::NotFound) => {
                ErrorEnvelope::new(status, "Not Found", "Record not found")
            }
            AppError::StoreError(_) => {
                ErrorEnvelope::new(status, "Service Unavailable", "A backing service is unavailable")
            }
            _ => ErrorEnvelope::new(status, "Internal Server Error", "An unexpected error occurred"),
        }
    }
}

/// Groups validator failures by field, keeping each rule's message.
pub fn field_messages(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        match self {
            AppError::AuthError(AuthError::RateLimitExceeded(window)) => window.rejection(),
            AppError::InvalidInput(errors) => HttpResponse::build(status).json(json!({
                "status": status.as_u16(),
                "message": "Validation failed",
                "errors": field_messages(errors),
            })),
            _ => HttpResponse::build(status).json(self.envelope()),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(e) => e.status_code(),
            AppError::ValidationError(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::DatabaseError(DatabaseError::NotFound) => StatusCode::NOT_FOUND,
            AppError::DatabaseError(DatabaseError::Duplicate) => StatusCode::CONFLICT,
            AppError::StoreError(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Credential, role and throttling failures.
///
/// The token variants are kept distinct for logging only; every one of them
/// is rendered as the same 401 envelope.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Malformed token")]
    MalformedToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Token signature mismatch")]
    SignatureMismatch,

    #[error("Missing credential")]
    MissingCredential,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Insufficient role")]
    InsufficientRole,

    #[error("Rate limit exceeded")]
    RateLimitExceeded(RateWindow),

    #[error("Cross-site request rejected")]
    CsrfRejected,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InsufficientRole | AuthError::CsrfRejected => StatusCode::FORBIDDEN,
            AuthError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let status = self.status_code();
        match self {
            AuthError::InvalidCredentials => {
                ErrorEnvelope::new(status, UNAUTHORIZED_MESSAGE, "Invalid email or password")
            }
            AuthError::InsufficientRole => {
                ErrorEnvelope::new(status, "Forbidden", "Admin role required")
            }
            AuthError::CsrfRejected => {
                ErrorEnvelope::new(status, "CSRF check failed", "Request origin is not allowed")
            }
            AuthError::RateLimitExceeded(_) => {
                ErrorEnvelope::new(status, "Too Many Requests", "Too Many Requests")
            }
            _ => ErrorEnvelope::unauthorized(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate record")]
    Duplicate,
}

/// Failures talking to the rate-limit counter store. All of them mean
/// "upstream store unavailable" to the limiter, which fails open.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store call timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}
