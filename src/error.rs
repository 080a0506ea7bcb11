//! Error types for aria-pilot
//!
//! This module provides error handling for the orchestrator, including:
//! - Domain-specific error types (daemon RPC, task lifecycle, persistence)
//! - HTTP status code mapping for the REST intake
//! - Structured error responses with machine-readable error codes

use crate::types::{JobId, OwnerId, Stage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for aria-pilot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for aria-pilot
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "daemon.rpc_url")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Download daemon returned an error or an unusable response
    #[error("daemon error: {0}")]
    Daemon(#[from] DaemonError),

    /// Owner-facing task operation failed
    #[error("{0}")]
    Task(#[from] TaskError),

    /// Classification service failed
    #[error("classifier error: {0}")]
    Classifier(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// The orchestrator loop is no longer running
    #[error("orchestrator is not running")]
    Stopped,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Errors reported by (or about) the download daemon's JSON-RPC interface
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The daemon answered with an error envelope
    #[error("{message} (code {code})")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message reported by the daemon
        message: String,
    },

    /// The response body could not be decoded in any known shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The envelope carried neither `result` nor `error`
    #[error("response carried no result")]
    MissingResult,
}

/// Errors of owner-driven task operations
#[derive(Debug, Error)]
pub enum TaskError {
    /// The owner has no task record for this job
    #[error("owner {owner_id} has no task with ID {job_id}")]
    NotFound {
        /// Owner that issued the request
        owner_id: OwnerId,
        /// Job identifier that was not found
        job_id: JobId,
    },

    /// The record is not in a stage that allows the operation
    #[error("cannot {operation} task {job_id} in stage {stage}")]
    InvalidStage {
        /// Job identifier of the record
        job_id: JobId,
        /// The record's current stage
        stage: Stage,
        /// The operation that was attempted
        operation: String,
    },

    /// The owner is not on the allow-list
    #[error("owner {owner_id} is not authorized")]
    Unauthorized {
        /// Rejected owner
        owner_id: OwnerId,
    },

    /// The submission text did not contain a magnet locator
    #[error("no magnet link found in request")]
    MissingLocator,

    /// The requested category is not a resolvable category
    #[error("invalid category: {0}")]
    InvalidCategory(String),
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "task_not_found",
///     "message": "owner u1 has no task with ID 2089b05ecca3d829",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "task_not_found", "unauthorized")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let details = match &error {
            Error::Task(TaskError::NotFound { owner_id, job_id }) => Some(serde_json::json!({
                "owner_id": owner_id,
                "job_id": job_id,
            })),
            Error::Task(TaskError::InvalidStage { job_id, stage, .. }) => {
                Some(serde_json::json!({ "job_id": job_id, "stage": stage }))
            }
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            _ => None,
        };

        let code = error.error_code().to_string();
        let message = error.to_string();
        match details {
            Some(details) => ApiError::with_details(code, message, details),
            None => ApiError::new(code, message),
        }
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::Task(task) => match task {
                TaskError::NotFound { .. } => 404,
                TaskError::InvalidStage { .. } => 409,
                TaskError::Unauthorized { .. } => 403,
                TaskError::MissingLocator | TaskError::InvalidCategory(_) => 422,
            },

            // 502 Bad Gateway - an upstream collaborator failed
            Error::Daemon(_) | Error::Network(_) | Error::Classifier(_) => 502,

            // 503 Service Unavailable
            Error::Stopped => 503,

            Error::Database(_)
            | Error::Sqlx(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::ApiServerError(_)
            | Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Daemon(_) => "daemon_error",
            Error::Task(task) => match task {
                TaskError::NotFound { .. } => "task_not_found",
                TaskError::InvalidStage { .. } => "invalid_stage",
                TaskError::Unauthorized { .. } => "unauthorized",
                TaskError::MissingLocator => "missing_locator",
                TaskError::InvalidCategory(_) => "invalid_category",
            },
            Error::Classifier(_) => "classifier_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Stopped => "stopped",
            Error::Other(_) => "internal_error",
        }
    }
}
