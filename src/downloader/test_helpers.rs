//! Shared test helpers for creating MediaDownloader instances in tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{Config, DuplicatePolicy};
use crate::downloader::MediaDownloader;
use crate::error::{PostProcessError, Result};
use crate::post_processing::{PostProcessOutcome, PostProcessor, PostProgress};
use crate::types::{Task, TaskStatus};

/// Config rooted in a fresh temp dir (which must be kept alive).
pub(crate) fn test_config(max_concurrent: usize) -> (Config, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = Config::default();
    config.download.library_dir = temp_dir.path().join("library");
    config.download.max_concurrent_downloads = max_concurrent;
    config.tools.search_path = false;
    (config, temp_dir)
}

/// Downloader with a running queue processor and no post-processing.
pub(crate) async fn create_test_downloader(
    max_concurrent: usize,
) -> (MediaDownloader, tempfile::TempDir) {
    let (config, temp_dir) = test_config(max_concurrent);
    (MediaDownloader::new(config).unwrap(), temp_dir)
}

/// Downloader using the replace duplicate policy.
pub(crate) async fn create_replacing_downloader(
    max_concurrent: usize,
) -> (MediaDownloader, tempfile::TempDir) {
    let (mut config, temp_dir) = test_config(max_concurrent);
    config.download.duplicate_policy = DuplicatePolicy::Replace;
    (MediaDownloader::new(config).unwrap(), temp_dir)
}

/// Downloader whose post-processing step is `post_processor`.
pub(crate) async fn create_downloader_with(
    max_concurrent: usize,
    post_processor: Arc<dyn PostProcessor>,
) -> (MediaDownloader, tempfile::TempDir) {
    let (config, temp_dir) = test_config(max_concurrent);
    (
        MediaDownloader::with_post_processor(config, post_processor).unwrap(),
        temp_dir,
    )
}

/// Serve `body` at `route`, optionally after `delay`.
pub(crate) async fn mount_file(server: &MockServer, route: &str, body: Vec<u8>, delay: Option<Duration>) {
    let mut response = ResponseTemplate::new(200).set_body_bytes(body);
    if let Some(delay) = delay {
        response = response.set_delay(delay);
    }
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Poll the store until the task for `url` satisfies `pred`.
pub(crate) async fn wait_for_task(
    downloader: &MediaDownloader,
    url: &str,
    pred: impl Fn(&Task) -> bool,
) -> Task {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(task) = downloader.get_progress(url)
            && pred(&task)
        {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {url}, last state: {:?}",
            downloader.get_progress(url)
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the task for `url` is in a terminal state.
pub(crate) async fn wait_for_terminal(downloader: &MediaDownloader, url: &str) -> Task {
    wait_for_task(downloader, url, |t| t.status.is_terminal()).await
}

/// Wait until the task for `url` has `status`.
pub(crate) async fn wait_for_status(
    downloader: &MediaDownloader,
    url: &str,
    status: TaskStatus,
) -> Task {
    wait_for_task(downloader, url, |t| t.status == status).await
}

/// How a [`FakePostProcessor`] behaves
#[derive(Clone, Copy, Debug)]
pub(crate) enum FakeBehavior {
    /// Report progress and write `<stem>.mp4`
    Convert,
    /// Return a skipped outcome pointing at the input
    Skip,
    /// Fail with a conversion error
    Fail,
    /// Panic inside the worker
    Panic,
    /// Hold the job until its cancellation token fires
    BlockUntilCancelled,
}

/// Post-processor that never shells out
pub(crate) struct FakePostProcessor {
    pub(crate) behavior: FakeBehavior,
}

impl FakePostProcessor {
    pub(crate) fn new(behavior: FakeBehavior) -> Arc<dyn PostProcessor> {
        Arc::new(Self { behavior })
    }
}

#[async_trait]
impl PostProcessor for FakePostProcessor {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn stage(&self) -> TaskStatus {
        TaskStatus::Converting
    }

    async fn process(
        &self,
        input: &Path,
        progress: PostProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<PostProcessOutcome> {
        match self.behavior {
            FakeBehavior::Convert => {
                for pct in [25.0, 50.0, 75.0, 100.0] {
                    progress(pct);
                }
                let output = input.with_extension("mp4");
                tokio::fs::rename(input, &output).await?;
                Ok(PostProcessOutcome::Converted {
                    output,
                    message: "Converted!".into(),
                })
            }
            FakeBehavior::Skip => Ok(PostProcessOutcome::Skipped {
                output: input.to_path_buf(),
                message: "Output file already exists".into(),
            }),
            FakeBehavior::Fail => Err(PostProcessError::ConversionFailed {
                path: input.to_path_buf(),
                reason: "encoder exploded".into(),
            }
            .into()),
            FakeBehavior::Panic => panic!("fake post-processor panic"),
            FakeBehavior::BlockUntilCancelled => {
                progress(10.0);
                cancel.cancelled().await;
                Err(PostProcessError::Cancelled.into())
            }
        }
    }
}
