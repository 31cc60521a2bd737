//! Error types for RagForge services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for each retrieval and ingestion failure mode
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Which half of a hybrid search failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchSide {
    Vector,
    Text,
}

impl fmt::Display for SearchSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchSide::Vector => write!(f, "vector"),
            SearchSide::Text => write!(f, "text"),
        }
    }
}

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // Authentication errors (2xxx)
    Unauthorized,

    // Tenant errors (3xxx)
    TenantIsolationViolation,

    // Resource errors (4xxx)
    DocumentNotFound,

    // Conflict errors (5xxx)
    Conflict,

    // Rate limiting (6xxx)
    RateLimited,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    EmbeddingFailure,
    IndexFailure,
    LexicalSearchFailure,
    SearchUnavailable,
    EventRelayError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    DimensionMismatch,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::Unauthorized => 2001,
            ErrorCode::TenantIsolationViolation => 3001,
            ErrorCode::DocumentNotFound => 4001,
            ErrorCode::Conflict => 5001,
            ErrorCode::RateLimited => 6001,
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,
            ErrorCode::EmbeddingFailure => 8001,
            ErrorCode::IndexFailure => 8002,
            ErrorCode::LexicalSearchFailure => 8003,
            ErrorCode::SearchUnavailable => 8004,
            ErrorCode::EventRelayError => 8005,
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::DimensionMismatch => 9003,
            ErrorCode::SerializationError => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// A tenant-scoped query was issued without its organization filter.
    /// This is a programming error, never a recoverable runtime condition.
    #[error("Tenant isolation violation: {message}")]
    TenantIsolationViolation { message: String },

    // Resource errors
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    // Conflict errors
    #[error("Conflict: {message}")]
    Conflict { message: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingFailure { message: String },

    #[error("Vector index error: {message}")]
    IndexFailure { message: String },

    #[error("Lexical search error: {message}")]
    LexicalSearchFailure { message: String },

    /// One side of a hybrid search failed; the whole search fails with it.
    #[error("Search unavailable: {side} search failed: {source}")]
    SearchFailed {
        side: SearchSide,
        #[source]
        source: Box<AppError>,
    },

    #[error("Event relay error: {message}")]
    EventRelay { message: String },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Shorthand for a validation error on a named field
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    /// Tag a sub-search error with the side of the hybrid search it came from
    pub fn search_failed(side: SearchSide, source: AppError) -> Self {
        AppError::SearchFailed {
            side,
            source: Box::new(source),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::TenantIsolationViolation { .. } => ErrorCode::TenantIsolationViolation,
            AppError::DocumentNotFound { .. } => ErrorCode::DocumentNotFound,
            AppError::Conflict { .. } => ErrorCode::Conflict,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::EmbeddingFailure { .. } => ErrorCode::EmbeddingFailure,
            AppError::IndexFailure { .. } => ErrorCode::IndexFailure,
            AppError::LexicalSearchFailure { .. } => ErrorCode::LexicalSearchFailure,
            AppError::SearchFailed { .. } => ErrorCode::SearchUnavailable,
            AppError::EventRelay { .. } => ErrorCode::EventRelayError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,

            // 404 Not Found
            AppError::DocumentNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict { .. } => StatusCode::CONFLICT,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::TenantIsolationViolation { .. }
            | AppError::SearchFailed { .. }
            | AppError::Database(_)
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::DimensionMismatch { .. }
            | AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::EmbeddingFailure { .. }
            | AppError::IndexFailure { .. }
            | AppError::LexicalSearchFailure { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::DatabaseConnection { .. } | AppError::EventRelay { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Structured details attached to the error response
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            AppError::SearchFailed { side, source } => Some(serde_json::json!({
                "failed_side": side,
                "cause": source.code(),
            })),
            _ => None,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::EventRelay {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::DocumentNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::DocumentNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::validation("query", "must not be empty");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
        assert_eq!(err.details().unwrap()["field"], "query");
    }

    #[test]
    fn test_search_failure_is_tagged() {
        let err = AppError::search_failed(
            SearchSide::Text,
            AppError::LexicalSearchFailure {
                message: "connection reset".into(),
            },
        );
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), ErrorCode::SearchUnavailable);
        assert!(err.to_string().starts_with("Search unavailable"));

        let details = err.details().unwrap();
        assert_eq!(details["failed_side"], "text");
        assert_eq!(details["cause"], "LEXICAL_SEARCH_FAILURE");
    }

    #[test]
    fn test_server_error() {
        let err = AppError::DimensionMismatch {
            expected: 1536,
            actual: 768,
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_server_error());
        assert_eq!(err.code().as_code(), 9003);
    }
}
