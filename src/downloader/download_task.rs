//! Download task execution: one job's run from `downloading` to a terminal state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::post_processing::{PostProcessOutcome, PostProcessor};
use crate::types::{Event, JobId, TaskStatus};

use super::{MediaDownloader, QueuedJob};

impl MediaDownloader {
    /// Core worker: download, optionally post-process, finalize.
    ///
    /// Every store write is tied to `job`; once the record has been replaced or
    /// cleared the remaining writes are ignored. Failures at any stage end in
    /// `failed` with a readable `error_message`; nothing is retried.
    pub(crate) async fn run_download_task(&self, queued: QueuedJob) {
        let QueuedJob {
            job,
            request,
            cancel,
        } = queued;
        let url = request.url.as_str();

        let started = self.store.update_job(url, job, |task| {
            task.status = TaskStatus::Downloading;
            task.message = Some("Downloading...".into());
        });
        if !started {
            tracing::debug!(url = %url, job = job.0, "Job superseded before start");
            return;
        }
        tracing::info!(url = %url, job = job.0, dir = %request.destination_dir.display(), "Download started");
        self.emit_event(Event::Started {
            url: url.to_string(),
            job,
        });

        // The store sees every chunk; subscribers get one event per whole percent
        let last_emitted = AtomicI64::new(-1);
        let on_progress = |percentage: f64, speed: &str, eta: Option<&str>| {
            let applied = self.store.update_job(url, job, |task| {
                task.progress_percentage = percentage;
                task.download_speed = Some(speed.to_string());
                task.eta = eta.map(str::to_string);
            });
            let whole = percentage.floor() as i64;
            if applied && last_emitted.fetch_max(whole, Ordering::Relaxed) < whole {
                self.emit_event(Event::Progress {
                    url: url.to_string(),
                    percent: percentage,
                    speed: speed.to_string(),
                    eta: eta.map(str::to_string),
                });
            }
        };

        let downloaded = match self
            .transfer
            .download(url, &request.destination_dir, &on_progress, &cancel)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(url = %url, job = job.0, error = %e, "Download failed");
                self.mark_failed(url, job, &e.to_string());
                return;
            }
        };
        tracing::info!(url = %url, job = job.0, path = %downloaded.display(), "Download finished");

        let Some(post_processor) = self.post_processor.clone() else {
            self.finish(
                url,
                job,
                TaskStatus::Completed,
                downloaded,
                "Download completed.".into(),
            );
            return;
        };

        match self
            .post_process(url, job, &post_processor, &downloaded, &cancel)
            .await
        {
            Ok(outcome) => {
                let status = outcome.status();
                let message = outcome.message().to_string();
                let output = match outcome {
                    PostProcessOutcome::Converted { output, .. }
                    | PostProcessOutcome::Completed { output, .. }
                    | PostProcessOutcome::Skipped { output, .. } => output,
                };
                self.finish(url, job, status, output, message);
            }
            Err(e) => {
                tracing::error!(
                    url = %url,
                    job = job.0,
                    post_processor = post_processor.name(),
                    error = %e,
                    "Post-processing failed"
                );
                self.mark_failed(url, job, &e.to_string());
            }
        }
    }

    async fn post_process(
        &self,
        url: &str,
        job: JobId,
        post_processor: &Arc<dyn PostProcessor>,
        input: &Path,
        cancel: &CancellationToken,
    ) -> crate::Result<PostProcessOutcome> {
        let stage = post_processor.stage();
        let verb = match stage {
            TaskStatus::Transcribing => "Transcribing",
            _ => "Converting",
        };

        let entered = self.store.update_job(url, job, |task| {
            task.status = stage;
            task.download_speed = None;
            task.eta = None;
            task.postprocess_percentage = Some(0.0);
            task.message = Some(format!("Starting {}...", verb.to_lowercase()));
        });
        if !entered {
            return Err(Error::Other("task was replaced before post-processing".into()));
        }
        self.emit_event(Event::PostProcessing {
            url: url.to_string(),
            status: stage,
        });
        tracing::info!(url = %url, job = job.0, post_processor = post_processor.name(), "Post-processing started");

        let report = |percentage: f64| {
            let percentage = percentage.clamp(0.0, 100.0);
            self.store.update_job(url, job, |task| {
                let current = task.postprocess_percentage.unwrap_or(0.0);
                task.postprocess_percentage = Some(current.max(percentage));
                task.message = Some(format!("{verb}: {percentage:.2}%"));
            });
        };

        post_processor.process(input, &report, cancel).await
    }

    /// Move the task into a successful terminal state.
    fn finish(&self, url: &str, job: JobId, status: TaskStatus, output: PathBuf, message: String) {
        let applied = self.store.update_job(url, job, |task| {
            task.status = status;
            task.progress_percentage = 100.0;
            task.output_path = Some(output.clone());
            task.error_message = None;
            task.download_speed = None;
            task.eta = None;
            task.message = Some(message);
            if task.postprocess_percentage.is_some() {
                task.postprocess_percentage = Some(100.0);
            }
        });
        if !applied {
            tracing::debug!(url = %url, job = job.0, "Job superseded, result discarded");
            return;
        }
        tracing::info!(url = %url, job = job.0, status = %status, output = %output.display(), "Task finished");
        self.emit_event(Event::Finished {
            url: url.to_string(),
            status,
            output_path: Some(output),
        });
    }

    /// Move the task into `failed` with a human-readable cause.
    pub(crate) fn mark_failed(&self, url: &str, job: JobId, error: &str) {
        let applied = self.store.update_job(url, job, |task| {
            task.status = TaskStatus::Failed;
            task.error_message = Some(error.to_string());
            task.message = Some(error.to_string());
            task.output_path = None;
            task.download_speed = None;
            task.eta = None;
        });
        if applied {
            self.emit_event(Event::Failed {
                url: url.to_string(),
                error: error.to_string(),
            });
        }
    }
}
