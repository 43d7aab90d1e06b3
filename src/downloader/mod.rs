//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by concern:
//! - [`queue`] - Accepting requests and the duplicate policy
//! - [`queue_processor`] - Bounded worker pool dispatch
//! - [`download_task`] - One task's run from `downloading` to a terminal state
//! - [`progress`] - Read-side queries over the progress store
//! - [`lifecycle`] - Shutdown coordination

mod download_task;
mod lifecycle;
mod progress;
mod queue;
mod queue_processor;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};

use tokio::sync::{Mutex, Notify, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::post_processing::{self, PostProcessor};
use crate::store::ProgressStore;
use crate::transfer::HttpTransfer;
use crate::types::{DownloadRequest, Event, JobId};

/// Event channel capacity; slower subscribers get `RecvError::Lagged`
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// A request waiting for a worker slot
#[derive(Debug, Clone)]
pub(crate) struct QueuedJob {
    pub(crate) job: JobId,
    pub(crate) request: DownloadRequest,
    pub(crate) cancel: CancellationToken,
}

/// Queue and worker pool state
#[derive(Clone)]
pub(crate) struct QueueState {
    /// FIFO of accepted requests not yet picked up by a worker
    pub(crate) queue: Arc<Mutex<VecDeque<QueuedJob>>>,
    /// Wakes the queue processor when a request is pushed
    pub(crate) queue_notify: Arc<Notify>,
    /// Limits simultaneous workers (respects max_concurrent_downloads)
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Cancellation tokens of queued and running jobs
    pub(crate) active_downloads: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
    /// Cleared during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Stops the queue processor
    pub(crate) shutdown: CancellationToken,
    /// Source of fresh job ids
    pub(crate) next_job_id: Arc<AtomicU64>,
}

impl QueueState {
    fn new(max_concurrent: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            queue_notify: Arc::new(Notify::new()),
            concurrent_limit: Arc::new(Semaphore::new(max_concurrent)),
            active_downloads: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown: CancellationToken::new(),
            next_job_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
///
/// Accepts download requests, runs them on a bounded worker pool, and keeps a
/// [`ProgressStore`] that polling consumers read through the query methods.
#[derive(Clone)]
pub struct MediaDownloader {
    /// Progress registry shared by workers and pollers
    pub(crate) store: ProgressStore,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Streaming HTTP client
    pub(crate) transfer: HttpTransfer,
    /// Step run after each successful download
    pub(crate) post_processor: Option<Arc<dyn PostProcessor>>,
    /// Queue and worker pool state
    pub(crate) queue_state: QueueState,
}

impl MediaDownloader {
    /// Create a downloader and start its queue processor
    ///
    /// The post-processor is chosen from `config.post_process.mode`; if its tool
    /// is missing, downloads finish without post-processing.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_dl::{Config, MediaDownloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = MediaDownloader::new(Config::default())?;
    ///     downloader
    ///         .enqueue_download("https://cdn.example.com/v/clip.mp4", "library/clips", None)
    ///         .await?;
    ///     Ok(())
    /// }
    /// ```
    pub fn new(config: Config) -> Result<Self> {
        let post_processor = post_processing::from_config(&config);
        Self::build(config, post_processor)
    }

    /// Create a downloader with a custom post-processing hook
    pub fn with_post_processor(config: Config, post_processor: Arc<dyn PostProcessor>) -> Result<Self> {
        Self::build(config, Some(post_processor))
    }

    fn build(config: Config, post_processor: Option<Arc<dyn PostProcessor>>) -> Result<Self> {
        let downloader = Self::assemble(config, post_processor)?;
        downloader.start_queue_processor();
        Ok(downloader)
    }

    /// Wire up all components without starting the queue processor
    pub(crate) fn assemble(
        config: Config,
        post_processor: Option<Arc<dyn PostProcessor>>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let transfer = HttpTransfer::from_config(&config.download)?;
        let queue_state = QueueState::new(config.download.max_concurrent_downloads);

        tracing::info!(
            library_dir = %config.download.library_dir.display(),
            max_concurrent_downloads = config.download.max_concurrent_downloads,
            duplicate_policy = ?config.download.duplicate_policy,
            post_processor = post_processor.as_ref().map(|p| p.name()).unwrap_or("none"),
            "Downloader initialized"
        );

        Ok(Self {
            store: ProgressStore::new(),
            event_tx,
            config: Arc::new(config),
            transfer,
            post_processor,
            queue_state,
        })
    }

    /// Subscribe to task events
    ///
    /// Each subscriber receives every event independently. A subscriber that falls
    /// more than 1000 events behind receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Name of the post-processing step, if one is configured
    pub fn post_processor_name(&self) -> Option<&'static str> {
        self.post_processor.as_ref().map(|p| p.name())
    }

    /// Handle to the underlying progress store
    pub fn progress_store(&self) -> &ProgressStore {
        &self.store
    }

    /// Emit an event to all subscribers; dropped silently when nobody listens.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = Arc::new(self.clone());
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }
}
