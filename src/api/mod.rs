//! REST API server module
//!
//! Exposes the job service over HTTP: job creation and inspection, artifact
//! download, format probing and a WebSocket push channel for progress.

use crate::{Config, MediaDownloader, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Jobs
/// - `POST /jobs` - Create a job from `{url, format?}`
/// - `GET /jobs` - List retained jobs
/// - `GET /jobs/:id` - Job status snapshot
/// - `DELETE /jobs/:id` - Cancel a job (idempotent)
/// - `GET /jobs/:id/file` - Stream the finished artifact
///
/// ## Push Channel
/// - `GET /ws` - WebSocket; subscribe/unsubscribe with JSON text frames
/// - `GET /jobs/:id/ws` - WebSocket for a single job
///
/// ## System
/// - `GET /health` - Liveness probe (never requires an API key)
/// - `GET /capabilities` - Extraction backend information
/// - `GET /formats?url=` - Formats offered by a URL
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(downloader: Arc<MediaDownloader>, config: Arc<Config>) -> Router {
    let state = AppState::new(downloader, config.clone());

    let protected = Router::new()
        // Jobs
        .route("/jobs", post(routes::create_job).get(routes::list_jobs))
        .route("/jobs/:id", get(routes::get_job).delete(routes::cancel_job))
        .route("/jobs/:id/file", get(routes::download_file))
        // Push channel
        .route("/ws", get(routes::ws_handler))
        .route("/jobs/:id/ws", get(routes::job_ws_handler))
        // System
        .route("/capabilities", get(routes::get_capabilities))
        .route("/formats", get(routes::list_formats))
        .route("/openapi.json", get(routes::openapi_spec));

    // Merge Swagger UI before applying state; it serves its own copy of the document
    let protected = if config.server.api.swagger_ui {
        protected.merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
    } else {
        protected
    };

    let protected = if config.server.api.api_key.is_some() {
        protected.route_layer(middleware::from_fn_with_state(
            config.server.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        protected
    };

    let router = Router::new()
        .route("/health", get(routes::health_check))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.server.api.cors_enabled {
        router.layer(build_cors_layer(&config.server.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; otherwise only the listed
/// origins are allowed. All methods and headers are permitted.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    let cors = if allow_any || origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(allowed))
    };

    cors.allow_methods(Any).allow_headers(Any)
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops, either due to an error or because the
/// process is shutting down.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaDownloader};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let downloader = Arc::new(MediaDownloader::new((*config).clone()).await?);
///
/// // Start API server (blocks until shutdown)
/// media_dl::api::start_api_server(downloader, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(downloader: Arc<MediaDownloader>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.server.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(downloader, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
