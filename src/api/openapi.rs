//! OpenAPI documentation and schema generation
//!
//! Describes the media-dl REST API using utoipa for compile-time spec
//! generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the media-dl REST API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation (if enabled)
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-dl REST API",
        version = "0.1.0",
        description = "Job service wrapping yt-dlp: create download jobs, follow their progress over WebSocket and fetch the resulting files",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::create_job,
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,
        crate::api::routes::cancel_job,
        crate::api::routes::download_file,

        // Push channel
        crate::api::routes::ws_handler,
        crate::api::routes::job_ws_handler,

        // System
        crate::api::routes::health_check,
        crate::api::routes::get_capabilities,
        crate::api::routes::list_formats,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        crate::types::JobId,
        crate::types::Status,
        crate::types::Progress,
        crate::types::ProgressEvent,
        crate::types::JobInfo,
        crate::types::JobFrame,
        crate::types::FormatInfo,
        crate::types::Capabilities,
        crate::types::ExtractorInfo,

        crate::api::routes::CreateJobRequest,
        crate::api::routes::CreateJobResponse,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Download jobs - create, inspect, cancel and fetch artifacts"),
        (name = "events", description = "WebSocket push channel for job progress"),
        (name = "system", description = "System endpoints - health, capabilities, format probing, OpenAPI"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security addon to add API key authentication scheme to OpenAPI spec
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
