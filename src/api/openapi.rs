//! OpenAPI documentation and schema generation

use utoipa::OpenApi;

/// OpenAPI documentation for the media-dl REST API
///
/// Served at `/api/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-dl REST API",
        version = "0.1.0",
        description = "Queue media downloads into a library folder and poll their progress",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8005", description = "Local development server")
    ),
    paths(
        crate::api::routes::add_download,
        crate::api::routes::get_progress,
        crate::api::routes::clear_progress,
        crate::api::routes::queue_stats,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        crate::types::JobId,
        crate::types::TaskStatus,
        crate::types::Task,
        crate::types::ClearResult,
        crate::types::QueueStats,
        crate::types::EnqueueOutcome,

        crate::config::Config,
        crate::config::DownloadConfig,
        crate::config::DuplicatePolicy,
        crate::config::PostProcessConfig,
        crate::config::PostProcessMode,
        crate::config::ToolsConfig,
        crate::config::ApiConfig,

        crate::api::routes::DownloadBody,
        crate::api::routes::DownloadResponse,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "downloads", description = "Queue downloads, poll progress, clear finished entries"),
        (name = "system", description = "Health check and OpenAPI spec"),
    )
)]
pub struct ApiDoc;
