/// Error Handling Module
///
/// Every failure the service can produce maps to one `AppError` variant.
/// It covers:
/// 1. Domain-specific error types (validation, authentication, store)
/// 2. The unified application error and its stable kind codes
/// 3. HTTP response mapping with structured logging
/// 4. Error context for request-scoped logging

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// A single violated input constraint
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("{0} is too short (minimum {1} characters)")]
    TooShort(&'static str, usize),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(&'static str, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(&'static str),
    #[error("{0} contains suspicious content")]
    SuspiciousContent(&'static str),
    #[error("user_type must be one of: ADMIN, USER")]
    UnknownUserType,
    /// Body or path the extractor could not decode
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

/// All constraints violated by one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationError> for ValidationErrors {
    fn from(err: ValidationError) -> Self {
        ValidationErrors(vec![err])
    }
}

/// Authentication and authorization errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Unknown email or wrong password. Deliberately one message for both.
    #[error("email or password incorrect")]
    InvalidCredentials,
    #[error("token is malformed or its signature is invalid")]
    MalformedToken,
    #[error("token has expired")]
    ExpiredToken,
    #[error("authentication required")]
    Unauthenticated,
    #[error("insufficient permissions for this resource")]
    Forbidden,
}

/// Identity store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unique index on email rejected the write
    #[error("an identity with this email already exists")]
    Duplicate,
    #[error("identity not found")]
    NotFound,
    #[error("store operation failed: {0}")]
    Persistence(String),
    #[error("store operation timed out")]
    Timeout,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                StoreError::Duplicate
            }
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::Persistence(err.to_string()),
        }
    }
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),
    #[error("an identity with this email already exists")]
    DuplicateIdentity,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("identity not found")]
    IdentityNotFound,
    #[error("password hashing failed: {0}")]
    HashingFailure(String),
    #[error(transparent)]
    Store(StoreError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => AppError::DuplicateIdentity,
            other => AppError::Store(other),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.into())
    }
}

impl AppError {
    /// Stable machine-readable error kind
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::DuplicateIdentity => "DUPLICATE_IDENTITY",
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
                AuthError::MalformedToken => "MALFORMED_TOKEN",
                AuthError::ExpiredToken => "EXPIRED_TOKEN",
                AuthError::Unauthenticated => "UNAUTHENTICATED",
                AuthError::Forbidden => "FORBIDDEN",
            },
            AppError::IdentityNotFound => "NOT_FOUND",
            AppError::HashingFailure(_) => "HASHING_FAILURE",
            AppError::Store(StoreError::Timeout) => "TIMEOUT",
            AppError::Store(_) => "PERSISTENCE_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to return to a client. Server-side failures never
    /// carry driver or store detail.
    pub fn public_message(&self) -> String {
        match self {
            AppError::HashingFailure(_)
            | AppError::Config(_)
            | AppError::Internal(_)
            | AppError::Store(StoreError::Persistence(_))
            | AppError::Store(StoreError::NotFound)
            | AppError::Store(StoreError::Duplicate) => "Internal server error".to_string(),
            AppError::Store(StoreError::Timeout) => "The request timed out".to_string(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
    /// Individual violated constraints, for validation errors
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let status = self.status_code();
        let mut response = ErrorResponse::new(
            request_id.to_string(),
            self.public_message(),
            self.code().to_string(),
            status.as_u16(),
        );

        if let AppError::Validation(errors) = self {
            response = response.with_details(errors.messages());
        }

        (status, response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::DuplicateIdentity => {
                tracing::warn!(request_id = request_id, "Duplicate identity attempt");
            }
            AppError::Auth(AuthError::InvalidCredentials) => {
                tracing::warn!(request_id = request_id, "Invalid credentials attempt");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::IdentityNotFound => {
                tracing::info!(request_id = request_id, "Identity not found");
            }
            AppError::Store(e) => {
                tracing::error!(request_id = request_id, error = %e, "Identity store error");
            }
            AppError::HashingFailure(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Password hashing error");
            }
            AppError::Config(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Configuration error");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateIdentity => StatusCode::CONFLICT,
            AppError::Auth(AuthError::Forbidden) => StatusCode::FORBIDDEN,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::IdentityNotFound => StatusCode::NOT_FOUND,
            AppError::Store(StoreError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Store(_)
            | AppError::HashingFailure(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Request-scoped context attached to log lines of one operation
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn log_error(&self, error: &AppError) {
        if error.status_code().is_server_error() {
            tracing::error!(
                request_id = %self.request_id,
                operation = %self.operation,
                user_id = ?self.user_id,
                code = error.code(),
                error = %error,
                "Operation failed"
            );
        } else {
            tracing::warn!(
                request_id = %self.request_id,
                operation = %self.operation,
                user_id = ?self.user_id,
                code = error.code(),
                error = %error,
                "Operation rejected"
            );
        }
    }
}
