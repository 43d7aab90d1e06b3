//! Queue processor: dispatches queued requests onto the bounded worker pool.

use std::time::Duration;

use super::{MediaDownloader, QueuedJob};

/// Fallback re-check interval in case a wakeup is missed
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl MediaDownloader {
    /// Start the queue processor task
    ///
    /// The processor loops until shutdown:
    /// 1. Acquires a worker slot (at most `max_concurrent_downloads` are held)
    /// 2. Takes the oldest queued request
    /// 3. Spawns a worker that keeps the slot through download and post-processing
    ///
    /// A slot is taken before the request is popped, so a request stays `queued`
    /// (and replaceable) until a worker is free to run it.
    pub(crate) fn start_queue_processor(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();
        let shutdown = self.queue_state.shutdown.clone();
        let concurrent_limit = self.queue_state.concurrent_limit.clone();

        tokio::spawn(async move {
            loop {
                let permit = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    permit = concurrent_limit.clone().acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => break, // semaphore closed
                    },
                };

                let Some(queued) = downloader.next_queued_job().await else {
                    break;
                };

                if queued.cancel.is_cancelled() {
                    tracing::debug!(job = queued.job.0, "Skipping job cancelled while queued");
                    // No-op for replaced jobs: the record already belongs to the newer job
                    downloader.mark_failed(&queued.request.url, queued.job, "download cancelled before start");
                    downloader.remove_from_active(queued.job).await;
                    continue;
                }

                let worker = downloader.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    worker.supervise(queued).await;
                });
            }
            tracing::debug!("Queue processor stopped");
        })
    }

    /// Wait for the next queued request; `None` once shutdown begins.
    async fn next_queued_job(&self) -> Option<QueuedJob> {
        loop {
            if let Some(job) = self.queue_state.queue.lock().await.pop_front() {
                return Some(job);
            }
            tokio::select! {
                _ = self.queue_state.shutdown.cancelled() => return None,
                _ = self.queue_state.queue_notify.notified() => {}
                _ = tokio::time::sleep(QUEUE_POLL_INTERVAL) => {}
            }
        }
    }

    /// Run one job in its own task so a panic is confined to that job.
    async fn supervise(&self, queued: QueuedJob) {
        let job = queued.job;
        let url = queued.request.url.clone();

        let worker = self.clone();
        let handle = tokio::spawn(async move { worker.run_download_task(queued).await });

        if let Err(e) = handle.await {
            let reason = if e.is_panic() {
                "worker panicked".to_string()
            } else {
                format!("worker aborted: {e}")
            };
            tracing::error!(url = %url, job = job.0, error = %reason, "Download worker crashed");
            self.mark_failed(&url, job, &reason);
        }

        self.remove_from_active(job).await;
    }
}
