//! Job management handlers.

use super::{CreateJobRequest, CreateJobResponse, parse_job_id};
use crate::api::AppState;
use crate::error::{Error, JobError};
use crate::utils::{attachment_disposition, content_type};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use tokio_util::io::ReaderStream;

/// POST /jobs - Create a download job
#[utoipa::path(
    post,
    path = "/jobs",
    tag = "jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Job accepted", body = CreateJobResponse),
        (status = 400, description = "Invalid URL or format", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            return Error::Job(JobError::invalid(rejection.body_text())).into_response();
        }
    };

    let format = request.format.as_deref().unwrap_or("best");
    match state.downloader.create_job(&request.url, format) {
        Ok(job_id) => (StatusCode::CREATED, Json(CreateJobResponse { job_id })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /jobs - List retained jobs, newest first
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "jobs",
    responses(
        (status = 200, description = "All retained jobs", body = Vec<crate::types::JobInfo>)
    )
)]
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.downloader.list_jobs())
}

/// GET /jobs/:id - Job status snapshot
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job snapshot", body = crate::types::JobInfo),
        (status = 404, description = "Unknown or evicted job", body = crate::error::ApiError)
    )
)]
pub async fn get_job(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let id = match parse_job_id(&raw) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.downloader.job(id) {
        Ok(info) => Json(info).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /jobs/:id - Cancel a job (idempotent)
#[utoipa::path(
    delete,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job snapshot after cancellation", body = crate::types::JobInfo),
        (status = 404, description = "Unknown or evicted job", body = crate::error::ApiError)
    )
)]
pub async fn cancel_job(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let id = match parse_job_id(&raw) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.downloader.cancel_job(id) {
        Ok(info) => Json(info).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /jobs/:id/file - Stream the finished artifact
#[utoipa::path(
    get,
    path = "/jobs/{id}/file",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Artifact bytes", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown job or artifact already served", body = crate::error::ApiError),
        (status = 409, description = "Job has not succeeded", body = crate::error::ApiError)
    )
)]
pub async fn download_file(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let id = match parse_job_id(&raw) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let path = match state.downloader.artifact(id).await {
        Ok(path) => path,
        Err(e) => return e.into_response(),
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Error::Job(JobError::ArtifactMissing { id }).into_response();
        }
        Err(e) => return Error::Io(e).into_response(),
    };
    let length = match file.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(e) => return Error::Io(e).into_response(),
    };

    tracing::info!(job_id = %id, path = %path.display(), bytes = length, "serving artifact");

    let stream = ReaderStream::new(file);
    let body = if state.config.jobs.delete_after_download {
        // Runs once the last chunk has been handed to the client.
        let downloader = state.downloader.clone();
        let cleanup = futures::stream::once(async move {
            downloader.discard_artifact(id).await;
        })
        .filter_map(|()| async { None::<std::io::Result<Bytes>> });
        Body::from_stream(stream.chain(cleanup))
    } else {
        Body::from_stream(stream)
    };

    (
        [
            (header::CONTENT_TYPE, content_type(&path).to_string()),
            (header::CONTENT_DISPOSITION, attachment_disposition(&path)),
            (header::CONTENT_LENGTH, length.to_string()),
        ],
        body,
    )
        .into_response()
}
