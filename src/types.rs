//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use utoipa::ToSchema;

/// Identifier of one accepted queue request
///
/// A URL can be queued many times over the life of the process; each accepted
/// request gets a fresh `JobId` so a worker can tell whether the record it is
/// updating still belongs to it.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Get the inner value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted and waiting for a worker slot
    Queued,
    /// Bytes are being streamed to disk
    Downloading,
    /// Container conversion running
    Converting,
    /// Transcription running
    Transcribing,
    /// Downloaded (and transcribed, if configured)
    Completed,
    /// Downloaded and converted
    Converted,
    /// Post-processing found nothing to do
    Skipped,
    /// Failed with error
    Failed,
}

impl TaskStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [TaskStatus; 8] = [
        TaskStatus::Queued,
        TaskStatus::Downloading,
        TaskStatus::Converting,
        TaskStatus::Transcribing,
        TaskStatus::Completed,
        TaskStatus::Converted,
        TaskStatus::Skipped,
        TaskStatus::Failed,
    ];

    /// No further automatic transition happens from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Converted | TaskStatus::Skipped | TaskStatus::Failed
        )
    }

    /// Queued or being worked on.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Lowercase name as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Converting => "converting",
            TaskStatus::Transcribing => "transcribing",
            TaskStatus::Completed => "completed",
            TaskStatus::Converted => "converted",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One download-and-postprocess unit, keyed by its source URL.
///
/// Records are replaced as a whole on every update, so readers never see a
/// half-written task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Task {
    /// Source URL (unique key in the progress store)
    pub url: String,
    /// Display name
    pub filename: String,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Download progress, 0.0 to 100.0
    pub progress_percentage: f64,
    /// Formatted transfer rate, e.g. "1.00 MB/s"
    pub download_speed: Option<String>,
    /// Formatted time remaining, e.g. "2m 5s"
    pub eta: Option<String>,
    /// Final file location (terminal success states only)
    #[schema(value_type = Option<String>)]
    pub output_path: Option<PathBuf>,
    /// Failure cause (`failed` only)
    pub error_message: Option<String>,
    /// Human-readable stage note
    pub message: Option<String>,
    /// Conversion or transcription progress, 0.0 to 100.0
    pub postprocess_percentage: Option<f64>,
    /// Creation or last-update instant
    pub timestamp: DateTime<Utc>,
    /// Job that owns this record
    #[serde(skip)]
    pub(crate) job: JobId,
}

impl Task {
    /// A freshly accepted task
    pub(crate) fn queued(url: impl Into<String>, filename: impl Into<String>, job: JobId) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            status: TaskStatus::Queued,
            progress_percentage: 0.0,
            download_speed: None,
            eta: None,
            output_path: None,
            error_message: None,
            message: Some("Download queued.".to_string()),
            postprocess_percentage: None,
            timestamp: Utc::now(),
            job,
        }
    }

    /// Job currently owning this record
    pub fn job(&self) -> JobId {
        self.job
    }
}

/// Snapshot entry returned to polling consumers
pub type TaskView = Task;

/// Ephemeral input to the scheduler; not retained after dispatch.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadRequest {
    /// Resource to fetch
    pub url: String,
    /// Directory the file is written into
    #[schema(value_type = String)]
    pub destination_dir: PathBuf,
    /// Optional display title (defaults to the file name derived from the URL)
    #[serde(default)]
    pub title: Option<String>,
}

impl DownloadRequest {
    /// Create a request without a display title
    pub fn new(url: impl Into<String>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination_dir: destination_dir.into(),
            title: None,
        }
    }

    /// Set the display title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Accepted queue request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EnqueueOutcome {
    /// Job created for the request
    pub job: JobId,
    /// Source URL
    pub url: String,
    /// Display name recorded on the task
    pub filename: String,
    /// Job that was cancelled to make room, under the replace policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced: Option<JobId>,
}

/// Result of clearing finalized entries
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClearResult {
    /// Number of entries removed
    pub removed_count: usize,
    /// Human-readable summary
    pub message: String,
}

/// Queue statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QueueStats {
    /// Number of tracked tasks
    pub total_jobs: usize,
    /// Task counts keyed by status name
    pub by_status: BTreeMap<String, usize>,
}

/// Event emitted during the task lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task accepted into the queue
    Queued {
        /// Source URL
        url: String,
        /// Job ID
        job: JobId,
    },

    /// A worker picked the task up
    Started {
        /// Source URL
        url: String,
        /// Job ID
        job: JobId,
    },

    /// Byte-level progress
    Progress {
        /// Source URL
        url: String,
        /// Progress percentage (0.0 to 100.0)
        percent: f64,
        /// Formatted speed
        speed: String,
        /// Formatted ETA
        #[serde(skip_serializing_if = "Option::is_none")]
        eta: Option<String>,
    },

    /// Download finished, post-processing started
    PostProcessing {
        /// Source URL
        url: String,
        /// `converting` or `transcribing`
        status: TaskStatus,
    },

    /// Task reached a successful terminal state
    Finished {
        /// Source URL
        url: String,
        /// `completed`, `converted` or `skipped`
        status: TaskStatus,
        /// Final file location
        #[serde(skip_serializing_if = "Option::is_none")]
        #[schema(value_type = Option<String>)]
        output_path: Option<PathBuf>,
    },

    /// Task failed
    Failed {
        /// Source URL
        url: String,
        /// Error message
        error: String,
    },

    /// Finalized entries were removed from the store
    Cleared {
        /// Number of removed entries
        removed: usize,
    },

    /// Downloader is shutting down
    Shutdown,
}
