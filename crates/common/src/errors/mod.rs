//! Error types for DealDesk
//!
//! Provides a single error enum for the grounding engine and its surfaces:
//! - Distinct variants for each failure mode of the reply pipeline
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

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

    // Scope errors (4xxx)
    ScopeError,

    // Grounding errors (5xxx)
    ToneConflict,
    UngroundedContent,

    // External collaborator errors (8xxx)
    RetrievalUnavailable,
    AuditUnavailable,
    Timeout,

    // Internal errors (9xxx)
    InternalError,
    PolicyConfigError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,

            ErrorCode::ScopeError => 4001,

            ErrorCode::ToneConflict => 5001,
            ErrorCode::UngroundedContent => 5002,

            ErrorCode::RetrievalUnavailable => 8001,
            ErrorCode::AuditUnavailable => 8002,
            ErrorCode::Timeout => 8003,

            ErrorCode::InternalError => 9001,
            ErrorCode::PolicyConfigError => 9002,
            ErrorCode::ConfigurationError => 9003,
            ErrorCode::SerializationError => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Unknown, closed, or mismatched deal
    #[error("Deal scope error for deal {deal_id}: {reason}")]
    Scope { deal_id: i64, reason: String },

    /// Invalid grounding thresholds; only ever raised at startup
    #[error("Invalid grounding policy: {message}")]
    PolicyConfig { message: String },

    /// Two applicable tone rules contradict, or a rule collides with evidence
    #[error("Tone rule conflict: {message}")]
    ToneConflict { message: String },

    /// Rendered text carries a figure that no evidence unit supports
    #[error("Rendered reply contains ungrounded content: {token}")]
    UngroundedContent { token: String },

    /// Persistence collaborator failed to return records
    #[error("Knowledge retrieval unavailable: {message}")]
    RetrievalUnavailable { message: String },

    /// Persistence collaborator rejected an audit append
    #[error("Audit log unavailable: {message}")]
    AuditUnavailable { message: String },

    #[error("Pipeline exceeded its budget of {budget_ms}ms")]
    Timeout { budget_ms: u64 },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::Scope { .. } => ErrorCode::ScopeError,
            AppError::PolicyConfig { .. } => ErrorCode::PolicyConfigError,
            AppError::ToneConflict { .. } => ErrorCode::ToneConflict,
            AppError::UngroundedContent { .. } => ErrorCode::UngroundedContent,
            AppError::RetrievalUnavailable { .. } => ErrorCode::RetrievalUnavailable,
            AppError::AuditUnavailable { .. } => ErrorCode::AuditUnavailable,
            AppError::Timeout { .. } => ErrorCode::Timeout,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration(_) => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::Scope { .. } => StatusCode::NOT_FOUND,

            // 422 Unprocessable Entity
            AppError::ToneConflict { .. } | AppError::UngroundedContent { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            // 500 Internal Server Error
            AppError::PolicyConfig { .. }
            | AppError::Internal { .. }
            | AppError::Configuration(_)
            | AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 503 Service Unavailable
            AppError::RetrievalUnavailable { .. } | AppError::AuditUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 504 Gateway Timeout
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
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

    /// Rendering failures degrade to the internal fallback notice instead of
    /// aborting the question.
    pub fn is_render_failure(&self) -> bool {
        matches!(
            self,
            AppError::ToneConflict { .. } | AppError::UngroundedContent { .. }
        )
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
    pub field: Option<String>,
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

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
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
