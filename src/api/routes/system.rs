//! System handlers: health, capabilities, format probing, OpenAPI.

use super::FormatsQuery;
use crate::api::AppState;
use crate::error::{Error, JobError};
use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// GET /health - Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is alive")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "accepting": state.downloader.is_accepting(),
    }))
}

/// GET /capabilities - Extraction backend information
#[utoipa::path(
    get,
    path = "/capabilities",
    tag = "system",
    responses(
        (status = 200, description = "Current capabilities", body = crate::types::Capabilities)
    )
)]
pub async fn get_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.downloader.capabilities())
}

/// GET /formats?url= - Formats a URL offers, without downloading
#[utoipa::path(
    get,
    path = "/formats",
    tag = "system",
    params(FormatsQuery),
    responses(
        (status = 200, description = "Available formats", body = Vec<crate::types::FormatInfo>),
        (status = 400, description = "Missing or invalid URL", body = crate::error::ApiError),
        (status = 501, description = "yt-dlp is not installed", body = crate::error::ApiError),
        (status = 502, description = "yt-dlp failed to probe the URL", body = crate::error::ApiError)
    )
)]
pub async fn list_formats(
    State(state): State<AppState>,
    query: Result<Query<FormatsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return Error::Job(JobError::invalid(rejection.body_text())).into_response();
        }
    };

    match state.downloader.list_formats(&query.url).await {
        Ok(formats) => Json(formats).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI 3 specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}
