//! Error types for MenuChat services
//!
//! Provides:
//! - `AppError` for everything that crosses the HTTP boundary
//! - `PipelineError`, the value-typed failure produced by the chat pipeline
//! - HTTP status code mapping and the structured error envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Resource errors (4xxx)
    NotFound,
    ConversationNotFound,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    LlmError,
    VectorSearchError,

    // Pipeline errors
    PipelineError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            ErrorCode::NotFound => 4001,
            ErrorCode::ConversationNotFound => 4002,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::LlmError => 8003,
            ErrorCode::VectorSearchError => 8004,

            ErrorCode::PipelineError => 8500,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
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

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Resource errors
    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("LLM provider error ({provider}): {message}")]
    LlmError { provider: String, message: String },

    #[error("Vector search error: {message}")]
    VectorSearch { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Pipeline failures, already collapsed to a stable tag
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Service-level failure carrying the status and tag chosen by the caller
    #[error("{message}")]
    Service { status: u16, message: String },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::ConversationNotFound { .. } => ErrorCode::ConversationNotFound,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::LlmError { .. } => ErrorCode::LlmError,
            AppError::VectorSearch { .. } => ErrorCode::VectorSearchError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Pipeline(_) => ErrorCode::PipelineError,
            AppError::Service { status, .. } if *status == 404 => ErrorCode::NotFound,
            AppError::Service { .. } => ErrorCode::InternalError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::InvalidFormat { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 404 Not Found
            AppError::ConversationNotFound { .. } => StatusCode::NOT_FOUND,

            AppError::Pipeline(err) => {
                StatusCode::from_u16(err.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }

            AppError::Service { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }

            // 502 Bad Gateway
            AppError::EmbeddingError { .. }
            | AppError::LlmError { .. }
            | AppError::VectorSearch { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
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

    /// Shorthand for a tagged service failure
    pub fn service(status: u16, message: impl Into<String>) -> Self {
        AppError::Service {
            status,
            message: message.into(),
        }
    }
}

/// Stage of the chat pipeline a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorKind {
    HistoryLoad,
    Retrieval,
    Generation,
}

impl PipelineErrorKind {
    /// Stable machine-readable tag for this failure
    pub fn tag(&self) -> &'static str {
        match self {
            PipelineErrorKind::HistoryLoad => "HISTORY_LOAD_ERROR",
            PipelineErrorKind::Retrieval => "RETRIEVAL_ERROR",
            PipelineErrorKind::Generation => "GENERATION_ERROR",
        }
    }
}

/// Failure of a single pipeline invocation.
///
/// Returned as a value by every stage so the orchestrator can decide uniformly.
/// Provider-specific causes (missing credentials, timeouts) are logged where they
/// happen and never leak into `message`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct PipelineError {
    #[serde(skip)]
    pub kind: Option<PipelineErrorKind>,
    pub code: u16,
    pub message: String,
}

impl PipelineError {
    pub fn new(kind: PipelineErrorKind) -> Self {
        Self {
            kind: Some(kind),
            code: 500,
            message: kind.tag().to_string(),
        }
    }

    pub fn history_load() -> Self {
        Self::new(PipelineErrorKind::HistoryLoad)
    }

    pub fn retrieval() -> Self {
        Self::new(PipelineErrorKind::Retrieval)
    }

    pub fn generation() -> Self {
        Self::new(PipelineErrorKind::Generation)
    }
}

/// Response envelope shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: ErrorDetails {
                code: None,
                message: None,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Pipeline and service failures already carry their public tag
        let message = match &self {
            AppError::Pipeline(err) => err.message.clone(),
            AppError::Service { message, .. } => message.clone(),
            _ if status.is_server_error() => "INTERNAL_SERVER_ERROR".to_string(),
            other => other.to_string(),
        };

        if self.is_server_error() {
            tracing::error!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body: ApiResponse<()> = ApiResponse {
            success: false,
            data: None,
            error: ErrorDetails {
                code: Some(code),
                message: Some(message),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseConnection {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::ConversationNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::ConversationNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "Question is empty".into(),
            field: Some("question".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_pipeline_errors_are_500_with_stable_tags() {
        for (err, tag) in [
            (PipelineError::history_load(), "HISTORY_LOAD_ERROR"),
            (PipelineError::retrieval(), "RETRIEVAL_ERROR"),
            (PipelineError::generation(), "GENERATION_ERROR"),
        ] {
            assert_eq!(err.code, 500);
            assert_eq!(err.message, tag);
            let app: AppError = err.into();
            assert_eq!(app.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(app.code(), ErrorCode::PipelineError);
        }
    }

    #[test]
    fn test_service_error_status() {
        let err = AppError::service(404, "CONVERSATION_NOT_FOUND");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "CONVERSATION_NOT_FOUND");
    }

    #[test]
    fn test_pipeline_error_serializes_code_and_message() {
        let json = serde_json::to_value(PipelineError::retrieval()).unwrap();
        assert_eq!(json, serde_json::json!({"code": 500, "message": "RETRIEVAL_ERROR"}));
    }

    #[test]
    fn test_sqlx_errors_are_database_errors() {
        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.code(), ErrorCode::ConnectionError);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
