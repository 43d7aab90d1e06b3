//! Accepting download requests and applying the duplicate policy.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result, SchedulingError, StorageError};
use crate::paths::resolve_within;
use crate::sanitize::sanitize;
use crate::transfer::HttpTransfer;
use crate::types::{DownloadRequest, EnqueueOutcome, Event, JobId, Task};

use super::lifecycle::SHUTDOWN_REASON;
use super::{MediaDownloader, QueuedJob};

impl MediaDownloader {
    /// Queue `url` for download into `destination_dir`.
    ///
    /// When the URL already has a queued or running task the configured
    /// [`DuplicatePolicy`](crate::config::DuplicatePolicy) decides: `reject`
    /// fails with [`SchedulingError::AlreadyActive`], `replace` cancels the old
    /// job and queues this one. A URL whose task is finished can always be
    /// queued again.
    pub async fn enqueue_download(
        &self,
        url: impl Into<String>,
        destination_dir: impl Into<PathBuf>,
        display_title: Option<String>,
    ) -> Result<EnqueueOutcome> {
        let mut request = DownloadRequest::new(url, destination_dir);
        request.title = display_title;
        self.enqueue(request).await
    }

    /// Queue a prepared [`DownloadRequest`].
    pub async fn enqueue(&self, request: DownloadRequest) -> Result<EnqueueOutcome> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(SchedulingError::ShuttingDown.into());
        }

        // Fails early on malformed URLs and names that sanitize to nothing
        let target = HttpTransfer::target_path(&request.url, &request.destination_dir)?;
        let filename = match request.title.as_deref().map(display_name) {
            Some(title) if !title.is_empty() => title,
            _ => target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        let job = JobId(self.queue_state.next_job_id.fetch_add(1, Ordering::SeqCst));
        let task = Task::queued(request.url.clone(), filename.clone(), job);

        let replaced = match self
            .store
            .admit(task, self.config.download.duplicate_policy)
        {
            Ok(replaced) => replaced,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "Rejected duplicate download request");
                return Err(e.into());
            }
        };

        if let Some(old) = replaced {
            self.cancel_job(old).await;
            tracing::info!(url = %request.url, old_job = old.0, new_job = job.0, "Replaced active download");
        }

        let cancel = CancellationToken::new();
        self.queue_state
            .active_downloads
            .lock()
            .await
            .insert(job, cancel.clone());

        // Queued goes out before a worker can emit Started
        let url = request.url.clone();
        tracing::info!(url = %url, job = job.0, filename = %filename, "Download queued");
        self.emit_event(Event::Queued {
            url: url.clone(),
            job,
        });

        self.push_queued(QueuedJob {
            job,
            request,
            cancel,
        })
        .await?;

        Ok(EnqueueOutcome {
            job,
            url,
            filename,
            replaced,
        })
    }

    /// Queue a download whose destination is relative to the library directory.
    ///
    /// Rejects destinations outside the library with [`Error::InvalidPath`] and
    /// refuses with [`SchedulingError::FileExists`] when the expected file (named
    /// after the title, or the URL when no title is given) is already present.
    /// A failed existence check is reported as [`StorageError::Inspect`].
    pub async fn submit(
        &self,
        url: impl Into<String>,
        relative_dir: impl AsRef<Path>,
        display_title: Option<String>,
    ) -> Result<EnqueueOutcome> {
        let url = url.into();
        let destination = resolve_within(self.config.library_dir(), relative_dir)?;

        let expected = match display_title.as_deref().map(display_name) {
            Some(name) if !name.is_empty() => destination.join(name),
            _ => HttpTransfer::target_path(&url, &destination)?,
        };
        match tokio::fs::try_exists(&expected).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::info!(url = %url, path = %expected.display(), "File already exists, not queueing");
                return Err(Error::from(SchedulingError::FileExists { path: expected }));
            }
            Err(source) => {
                tracing::warn!(url = %url, path = %expected.display(), error = %source, "Could not check for existing file");
                return Err(StorageError::Inspect {
                    path: expected,
                    source,
                }
                .into());
            }
        }

        self.enqueue_download(url, destination, display_title).await
    }

    /// Hand a job to the queue processor unless shutdown has begun.
    ///
    /// The flag is read under the queue lock, so a job either lands before
    /// shutdown drains the queue or is failed here.
    pub(crate) async fn push_queued(&self, queued: QueuedJob) -> Result<()> {
        let mut queue = self.queue_state.queue.lock().await;
        if self.queue_state.accepting_new.load(Ordering::SeqCst) {
            queue.push_back(queued);
            drop(queue);
            self.queue_state.queue_notify.notify_one();
            return Ok(());
        }
        drop(queue);

        tracing::info!(url = %queued.request.url, job = queued.job.0, "Shutdown began during enqueue, failing job");
        self.mark_failed(&queued.request.url, queued.job, SHUTDOWN_REASON);
        self.remove_from_active(queued.job).await;
        Err(SchedulingError::ShuttingDown.into())
    }

    /// Cancel a queued or running job and drop it from the queue.
    pub(crate) async fn cancel_job(&self, job: JobId) {
        if let Some(token) = self.queue_state.active_downloads.lock().await.get(&job) {
            token.cancel();
        }
        let removed = {
            let mut queue = self.queue_state.queue.lock().await;
            let before = queue.len();
            queue.retain(|queued| queued.job != job);
            before != queue.len()
        };
        if removed {
            self.remove_from_active(job).await;
        }
        tracing::debug!(job = job.0, was_queued = removed, "Cancelled job");
    }

    /// Forget a job's cancellation token.
    pub(crate) async fn remove_from_active(&self, job: JobId) {
        self.queue_state.active_downloads.lock().await.remove(&job);
    }
}

/// Sanitized last component of a caller-supplied title.
fn display_name(title: &str) -> String {
    let base = title
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(title);
    sanitize(base)
}
