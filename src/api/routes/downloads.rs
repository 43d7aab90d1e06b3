//! Download queueing and progress handlers.

use std::collections::HashMap;

use crate::api::AppState;
use crate::api::routes::{DownloadBody, DownloadResponse};
use crate::types::{ClearResult, QueueStats, TaskView};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// POST /api/download - Queue a URL into a library folder
#[utoipa::path(
    post,
    path = "/api/download",
    tag = "downloads",
    request_body = DownloadBody,
    responses(
        (status = 201, description = "Download queued", body = DownloadResponse),
        (status = 400, description = "Malformed URL"),
        (status = 403, description = "Destination outside the library"),
        (status = 409, description = "URL already active or file already exists"),
        (status = 422, description = "URL does not name a usable file"),
        (status = 503, description = "Shutting down")
    )
)]
pub async fn add_download(
    State(state): State<AppState>,
    Json(body): Json<DownloadBody>,
) -> crate::Result<impl IntoResponse> {
    tracing::info!(url = %body.url, path = %body.path, "Received download request");

    let outcome = state
        .downloader
        .submit(body.url, &body.path, body.title)
        .await?;

    let response = DownloadResponse {
        status: "queued".to_string(),
        message: format!(
            "Download for {} queued. Conversion will start automatically after download.",
            outcome.url
        ),
        job: outcome.job,
        filename: outcome.filename,
        replaced: outcome.replaced,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/progress - Every tracked task keyed by URL
#[utoipa::path(
    get,
    path = "/api/progress",
    tag = "downloads",
    responses(
        (status = 200, description = "Object mapping each URL to its Task")
    )
)]
pub async fn get_progress(State(state): State<AppState>) -> Json<HashMap<String, TaskView>> {
    Json(state.downloader.get_progress_snapshot())
}

/// POST /api/clear_progress - Remove finished entries
#[utoipa::path(
    post,
    path = "/api/clear_progress",
    tag = "downloads",
    responses(
        (status = 200, description = "Finished entries removed", body = ClearResult)
    )
)]
pub async fn clear_progress(State(state): State<AppState>) -> Json<ClearResult> {
    Json(state.downloader.clear_finalized_progress())
}

/// GET /api/queue/stats - Task counts by status
#[utoipa::path(
    get,
    path = "/api/queue/stats",
    tag = "downloads",
    responses(
        (status = 200, description = "Queue statistics", body = QueueStats)
    )
)]
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.downloader.queue_stats())
}
