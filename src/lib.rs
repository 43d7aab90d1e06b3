//! # media-dl
//!
//! Queue-driven media download manager for a personal library.
//!
//! A caller submits a URL and a destination folder; the downloader streams
//! the file to disk in the background with a bounded number of concurrent
//! workers, optionally converts or transcribes it, and records every state
//! change in an in-memory progress store that pollers read as a snapshot.
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, MediaDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = MediaDownloader::new(Config::default())?;
//!
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     downloader
//!         .submit("https://cdn.example.com/v/clip.mp4", "Clips", None)
//!         .await?;
//!
//!     for task in downloader.progress_list() {
//!         println!("{} {} {:.1}%", task.filename, task.status, task.progress_percentage);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Download queue, workers and lifecycle
pub mod downloader;
/// Error types
pub mod error;
/// Library path resolution
pub mod paths;
/// Conversion and transcription after download
pub mod post_processing;
/// Filename sanitizing
pub mod sanitize;
/// In-memory progress store
pub mod store;
/// Streamed HTTP transfers
pub mod transfer;
/// Core types and events
pub mod types;

pub use config::{Config, DuplicatePolicy, PostProcessMode};
pub use downloader::MediaDownloader;
pub use error::{
    ApiError, Error, ErrorDetail, PostProcessError, Result, SchedulingError, StorageError,
    ToHttpStatus, TransferError,
};
pub use post_processing::{
    CommandTranscriber, FfmpegConverter, PostProcessOutcome, PostProcessor, PostProgress,
};
pub use store::ProgressStore;
pub use transfer::{HttpTransfer, ProgressCallback};
pub use types::{
    ClearResult, DownloadRequest, EnqueueOutcome, Event, JobId, QueueStats, Task, TaskStatus,
    TaskView,
};

/// Wait for a termination signal, then shut the downloader down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(Config::default())?;
///     run_with_shutdown(downloader).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
