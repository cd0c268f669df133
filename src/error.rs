//! Error types for media-dl
//!
//! This module provides error handling for the library, including:
//! - Job-level error taxonomy (invalid request, unknown job, spawn and extraction failures)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use crate::types::{JobId, Status};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "output_dir")
        key: Option<String>,
    },

    /// Job-related error
    #[error(transparent)]
    Job(#[from] JobError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// External tool invocation failed outside of a job (format probing)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required to start a job
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Job-related errors
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// Rejected before any job or process is created
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Why the request was rejected
        reason: String,
    },

    /// Unknown or already evicted job
    #[error("job {id} not found")]
    NotFound {
        /// The job ID that was not found
        id: JobId,
    },

    /// Artifact requested before the job succeeded
    #[error("job {id} is {status}, artifact not available")]
    NotReady {
        /// The job ID
        id: JobId,
        /// The job's current status
        status: Status,
    },

    /// Artifact no longer on disk (already served once or removed)
    #[error("file for job {id} not found or already downloaded")]
    ArtifactMissing {
        /// The job ID
        id: JobId,
    },

    /// The extractor process could not be started
    #[error("failed to start extractor for job {id}: {reason}")]
    ProcessSpawnFailure {
        /// The job ID
        id: JobId,
        /// Underlying spawn error
        reason: String,
    },

    /// The extractor exited unsuccessfully
    #[error("extraction failed for job {id}: {reason}")]
    ExtractionFailure {
        /// The job ID
        id: JobId,
        /// Captured diagnostic output
        reason: String,
    },
}

impl JobError {
    /// Shorthand for [`JobError::InvalidRequest`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        JobError::InvalidRequest {
            reason: reason.into(),
        }
    }
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "job_not_found",
///     "message": "job 3f2c... not found",
///     "details": {
///       "job_id": "3f2c..."
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "job_not_found", "invalid_request")
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

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
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
            Error::Job(e) => match e {
                JobError::InvalidRequest { .. } => 400,
                JobError::NotFound { .. } => 404,
                JobError::ArtifactMissing { .. } => 404,
                JobError::NotReady { .. } => 409,
                JobError::ExtractionFailure { .. } => 502,
                JobError::ProcessSpawnFailure { .. } => 503,
            },
            Error::InsufficientSpace { .. } => 507,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
            Error::ExternalTool(_) => 502,
            Error::ShuttingDown => 503,
            Error::NotSupported(_) => 501,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Job(e) => match e {
                JobError::InvalidRequest { .. } => "invalid_request",
                JobError::NotFound { .. } => "job_not_found",
                JobError::NotReady { .. } => "not_ready",
                JobError::ArtifactMissing { .. } => "artifact_missing",
                JobError::ProcessSpawnFailure { .. } => "process_spawn_failure",
                JobError::ExtractionFailure { .. } => "extraction_failure",
            },
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ShuttingDown => "shutting_down",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::InsufficientSpace { .. } => "insufficient_space",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Job(JobError::NotFound { id }) | Error::Job(JobError::ArtifactMissing { id }) => {
                Some(serde_json::json!({ "job_id": id }))
            }
            Error::Job(JobError::NotReady { id, status }) => Some(serde_json::json!({
                "job_id": id,
                "status": status,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            Error::InsufficientSpace {
                required,
                available,
            } => Some(serde_json::json!({
                "required_bytes": required,
                "available_bytes": available,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
