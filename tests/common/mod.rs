//! Common test utilities for media-dl integration tests

use std::time::Duration;

use media_dl::{Config, MediaDownloader, Task};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Downloader rooted in a fresh temp library with post-processing disabled
pub fn downloader(max_concurrent: usize) -> (MediaDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.download.library_dir = temp_dir.path().join("library");
    config.download.max_concurrent_downloads = max_concurrent;
    config.tools.search_path = false;
    (MediaDownloader::new(config).unwrap(), temp_dir)
}

/// Serve `body` at `route`, optionally after `delay`
pub async fn serve(server: &MockServer, route: &str, body: Vec<u8>, delay: Option<Duration>) {
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

/// Poll until the task for `url` reaches a terminal state
pub async fn wait_for_terminal(downloader: &MediaDownloader, url: &str) -> Task {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(task) = downloader.get_progress(url)
            && task.status.is_terminal()
        {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {url}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
