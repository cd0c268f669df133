//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] - Create, inspect, cancel jobs and fetch artifacts
//! - [`system`] - Health, capabilities, format probing, OpenAPI
//! - [`ws`] - WebSocket push channel

use crate::error::ApiError;
use crate::types::JobId;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

mod jobs;
mod system;
mod ws;

// Re-export all handlers so `routes::function_name` works from the router
pub use jobs::*;
pub use system::*;
pub use ws::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Request body for POST /jobs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CreateJobRequest {
    /// Media page URL (http or https)
    pub url: String,
    /// Format preset (`best`, `bestaudio`, `worst`, `mp3`, `m4a`) or a raw
    /// selector; defaults to `best`
    #[serde(default)]
    pub format: Option<String>,
}

/// Response for POST /jobs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    /// Identifier of the new job
    pub job_id: JobId,
}

/// Query parameters for GET /formats
#[derive(Debug, Deserialize, Serialize, utoipa::IntoParams)]
pub struct FormatsQuery {
    /// Media page URL to probe
    pub url: String,
}

/// Parse a path segment into a [`JobId`]
///
/// Anything that is not a UUID cannot name a job, so it is answered like an
/// unknown id.
pub(crate) fn parse_job_id(raw: &str) -> Result<JobId, Response> {
    raw.parse()
        .map_err(|_| (StatusCode::NOT_FOUND, Json(unknown_job(raw))).into_response())
}

/// `job_not_found` body for an identifier that does not name a job
pub(crate) fn unknown_job(raw: &str) -> ApiError {
    ApiError::new("job_not_found", format!("job {raw} not found"))
}
