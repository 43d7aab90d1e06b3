//! Route handlers for the REST API
//!
//! - [`downloads`] - Queueing and progress polling
//! - [`system`] - Health and OpenAPI

use serde::{Deserialize, Serialize};

use crate::types::JobId;

mod downloads;
mod system;

pub use downloads::*;
pub use system::*;

/// Request body for POST /api/download
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct DownloadBody {
    /// Resource to fetch
    pub url: String,
    /// Destination folder relative to the library directory
    #[serde(default)]
    pub path: String,
    /// Display title, used for the file name when present
    #[serde(default)]
    pub title: Option<String>,
}

/// Response for POST /api/download
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct DownloadResponse {
    /// Always "queued"
    pub status: String,
    /// Human-readable confirmation
    pub message: String,
    /// Job created for the request
    pub job: JobId,
    /// File name recorded on the task
    pub filename: String,
    /// Job cancelled to make room, under the replace policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced: Option<JobId>,
}
