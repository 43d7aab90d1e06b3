//! Post-processing hooks run after a successful download
//!
//! A post-processor takes the downloaded file and produces the task's final
//! output. Two implementations ship with the crate:
//! - [`FfmpegConverter`] - Re-encodes into an MP4 container
//! - [`CommandTranscriber`] - Generates subtitles with a whisper-style CLI
//!
//! Custom implementations can be installed with
//! [`MediaDownloader::with_post_processor`](crate::MediaDownloader::with_post_processor).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, PostProcessMode};
use crate::error::Result;
use crate::types::TaskStatus;

mod ffmpeg;
mod transcriber;

pub use ffmpeg::{FfmpegConverter, parse_progress_seconds};
pub use transcriber::CommandTranscriber;

/// Progress sink for post-processing, receives 0.0 to 100.0
pub type PostProgress<'a> = &'a (dyn Fn(f64) + Send + Sync);

/// Terminal result of a post-processing step
#[derive(Debug, Clone, PartialEq)]
pub enum PostProcessOutcome {
    /// A new container was written (or the input already had the target format)
    Converted {
        /// Final file location
        output: PathBuf,
        /// Human-readable note
        message: String,
    },
    /// Side products were generated next to the file; the file itself is the output
    Completed {
        /// Final file location
        output: PathBuf,
        /// Human-readable note
        message: String,
    },
    /// Nothing needed doing, e.g. the target already exists
    Skipped {
        /// Existing file that stands in for the output
        output: PathBuf,
        /// Human-readable note
        message: String,
    },
}

impl PostProcessOutcome {
    /// Terminal task status for this outcome
    pub fn status(&self) -> TaskStatus {
        match self {
            PostProcessOutcome::Converted { .. } => TaskStatus::Converted,
            PostProcessOutcome::Completed { .. } => TaskStatus::Completed,
            PostProcessOutcome::Skipped { .. } => TaskStatus::Skipped,
        }
    }

    /// Final file location
    pub fn output(&self) -> &Path {
        match self {
            PostProcessOutcome::Converted { output, .. }
            | PostProcessOutcome::Completed { output, .. }
            | PostProcessOutcome::Skipped { output, .. } => output,
        }
    }

    /// Human-readable note
    pub fn message(&self) -> &str {
        match self {
            PostProcessOutcome::Converted { message, .. }
            | PostProcessOutcome::Completed { message, .. }
            | PostProcessOutcome::Skipped { message, .. } => message,
        }
    }
}

/// Step run on a downloaded file before its task is finalized
///
/// Implementations are external collaborators (encoders, transcribers); a failure
/// marks the task `failed` with the error's message. `cancel` fires when the job
/// is replaced or the downloader shuts down; implementations must stop any child
/// process and leave the input file in place.
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use media_dl::post_processing::{PostProcessOutcome, PostProcessor, PostProgress};
/// use media_dl::TaskStatus;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// struct Checksum;
///
/// #[async_trait]
/// impl PostProcessor for Checksum {
///     fn name(&self) -> &'static str {
///         "checksum"
///     }
///
///     fn stage(&self) -> TaskStatus {
///         TaskStatus::Converting
///     }
///
///     async fn process(
///         &self,
///         input: &Path,
///         progress: PostProgress<'_>,
///         _cancel: &CancellationToken,
///     ) -> media_dl::Result<PostProcessOutcome> {
///         progress(100.0);
///         Ok(PostProcessOutcome::Completed {
///             output: input.to_path_buf(),
///             message: "Checked.".into(),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait PostProcessor: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// In-progress status shown while this step runs
    /// ([`TaskStatus::Converting`] or [`TaskStatus::Transcribing`])
    fn stage(&self) -> TaskStatus;

    /// Process `input`, reporting progress through `progress`
    async fn process(
        &self,
        input: &Path,
        progress: PostProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<PostProcessOutcome>;
}

/// Build the post-processor selected by `config.post_process.mode`.
///
/// Returns `None` when no step is configured or when the required tool cannot be
/// found; in the latter case a warning is logged and downloads finish without
/// post-processing.
pub fn from_config(config: &Config) -> Option<Arc<dyn PostProcessor>> {
    let handler: Option<Arc<dyn PostProcessor>> = match config.post_process.mode {
        PostProcessMode::None => return None,
        PostProcessMode::Convert => {
            FfmpegConverter::from_config(&config.tools, &config.post_process)
                .map(|c| Arc::new(c) as Arc<dyn PostProcessor>)
        }
        PostProcessMode::Transcribe => CommandTranscriber::from_config(&config.tools)
            .map(|t| Arc::new(t) as Arc<dyn PostProcessor>),
    };

    match &handler {
        Some(h) => tracing::info!(post_processor = h.name(), "Post-processor initialized"),
        None => tracing::warn!(
            mode = ?config.post_process.mode,
            "Post-processing tool not found, downloads will finish without post-processing"
        ),
    }
    handler
}

/// Resolve a tool binary from an explicit path or, if allowed, from PATH.
pub(crate) fn resolve_tool(explicit: Option<&PathBuf>, name: &str, search_path: bool) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.clone());
    }
    if search_path {
        which::which(name).ok()
    } else {
        None
    }
}
