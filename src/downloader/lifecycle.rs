//! Shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::Result;
use crate::types::Event;

use super::MediaDownloader;

/// How long running workers get to observe cancellation
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Reason recorded on tasks that never got to run
pub(super) const SHUTDOWN_REASON: &str = "download cancelled: downloader shutting down";

impl MediaDownloader {
    /// Gracefully shut down the downloader
    ///
    /// 1. Stops accepting new requests
    /// 2. Stops the queue processor and fails requests still waiting in the queue
    /// 3. Cancels running workers (between chunks and during post-processing)
    /// 4. Waits up to 30 seconds for them to finish
    /// 5. Emits [`Event::Shutdown`]
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.queue_state.accepting_new.store(false, Ordering::SeqCst);
        self.queue_state.shutdown.cancel();
        tracing::info!("Stopped accepting new downloads");

        let pending: Vec<_> = self.queue_state.queue.lock().await.drain(..).collect();
        for queued in &pending {
            self.mark_failed(&queued.request.url, queued.job, SHUTDOWN_REASON);
            self.remove_from_active(queued.job).await;
        }
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "Failed queued downloads that never started");
        }

        self.cancel_all_active().await;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_downloads()).await {
            Ok(()) => tracing::info!("All active downloads stopped"),
            Err(_) => {
                tracing::warn!("Timeout waiting for downloads to stop, proceeding with shutdown")
            }
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Signal cancellation to every queued and running job
    pub(crate) async fn cancel_all_active(&self) {
        let active = self.queue_state.active_downloads.lock().await;
        tracing::debug!(active_count = active.len(), "Cancelling active downloads");
        for (job, token) in active.iter() {
            tracing::debug!(job = job.0, "Signaling cancellation");
            token.cancel();
        }
    }

    async fn wait_for_active_downloads(&self) {
        loop {
            let active_count = self.queue_state.active_downloads.lock().await.len();
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "Waiting for active downloads to stop");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Whether new requests are still accepted
    pub fn is_accepting(&self) -> bool {
        self.queue_state.accepting_new.load(Ordering::SeqCst)
    }
}
