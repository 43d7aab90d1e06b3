use std::time::Duration;

use wiremock::MockServer;

use crate::config::DuplicatePolicy;
use crate::downloader::MediaDownloader;
use crate::downloader::test_helpers::*;
use crate::error::{Error, SchedulingError, StorageError, TransferError};
use crate::types::{Event, TaskStatus};

#[tokio::test]
async fn enqueue_records_queued_task_and_emits_event() {
    let (downloader, temp_dir) = create_test_downloader(1).await;
    let server = MockServer::start().await;
    mount_file(&server, "/v/clip.mp4", vec![1; 16], Some(Duration::from_secs(1))).await;

    let mut events = downloader.subscribe();
    let url = format!("{}/v/clip.mp4", server.uri());
    let outcome = downloader
        .enqueue_download(&url, temp_dir.path().join("out"), None)
        .await
        .unwrap();

    assert_eq!(outcome.url, url);
    assert_eq!(outcome.filename, "clip.mp4");
    assert!(outcome.replaced.is_none());

    let task = downloader.get_progress(&url).unwrap();
    assert!(matches!(
        task.status,
        TaskStatus::Queued | TaskStatus::Downloading
    ));
    assert_eq!(task.job(), outcome.job);

    match events.recv().await.unwrap() {
        Event::Queued { url: u, job } => {
            assert_eq!(u, url);
            assert_eq!(job, outcome.job);
        }
        other => panic!("expected Queued, got {other:?}"),
    }
}

#[tokio::test]
async fn display_title_is_sanitized_into_filename() {
    let (downloader, temp_dir) = create_test_downloader(1).await;
    let outcome = downloader
        .enqueue_download(
            "http://127.0.0.1:9/v/x.mp4",
            temp_dir.path(),
            Some("Season 1/Episode: 3 (Raw).mp4".into()),
        )
        .await
        .unwrap();
    assert_eq!(outcome.filename, "Episode 3.mp4");
}

#[tokio::test]
async fn rejects_active_duplicate_by_default() {
    let (downloader, temp_dir) = create_test_downloader(1).await;
    let server = MockServer::start().await;
    mount_file(&server, "/slow.mp4", vec![0; 64], Some(Duration::from_secs(2))).await;

    let url = format!("{}/slow.mp4", server.uri());
    let first = downloader
        .enqueue_download(&url, temp_dir.path(), None)
        .await
        .unwrap();
    wait_for_status(&downloader, &url, TaskStatus::Downloading).await;

    let err = downloader
        .enqueue_download(&url, temp_dir.path(), None)
        .await
        .unwrap_err();
    match err {
        Error::Scheduling(SchedulingError::AlreadyActive { status, .. }) => {
            assert_eq!(status, TaskStatus::Downloading)
        }
        other => panic!("expected AlreadyActive, got {other:?}"),
    }

    // The running job still owns the record
    assert_eq!(downloader.get_progress(&url).unwrap().job(), first.job);
    assert_eq!(downloader.queue_stats().total_jobs, 1);
}

#[tokio::test]
async fn rejects_queued_duplicate_by_default() {
    let (downloader, temp_dir) = create_test_downloader(1).await;
    let server = MockServer::start().await;
    mount_file(&server, "/busy.mp4", vec![0; 8], Some(Duration::from_secs(2))).await;
    mount_file(&server, "/waiting.mp4", vec![0; 8], None).await;

    let busy = format!("{}/busy.mp4", server.uri());
    let waiting = format!("{}/waiting.mp4", server.uri());
    downloader
        .enqueue_download(&busy, temp_dir.path(), None)
        .await
        .unwrap();
    wait_for_status(&downloader, &busy, TaskStatus::Downloading).await;
    downloader
        .enqueue_download(&waiting, temp_dir.path(), None)
        .await
        .unwrap();

    let err = downloader
        .enqueue_download(&waiting, temp_dir.path(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Scheduling(SchedulingError::AlreadyActive {
            status: TaskStatus::Queued,
            ..
        })
    ));
}

#[tokio::test]
async fn replace_policy_cancels_running_job() {
    let (downloader, temp_dir) = create_replacing_downloader(2).await;
    let server = MockServer::start().await;
    mount_file(
        &server,
        "/episode.mkv",
        b"episode".to_vec(),
        Some(Duration::from_millis(500)),
    )
    .await;

    let url = format!("{}/episode.mkv", server.uri());
    let first = downloader
        .enqueue_download(&url, temp_dir.path(), None)
        .await
        .unwrap();
    wait_for_status(&downloader, &url, TaskStatus::Downloading).await;

    let second = downloader
        .enqueue_download(&url, temp_dir.path(), None)
        .await
        .unwrap();
    assert_eq!(second.replaced, Some(first.job));
    assert_ne!(second.job, first.job);

    let task = wait_for_terminal(&downloader, &url).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.job(), second.job);
    assert_eq!(
        std::fs::read(temp_dir.path().join("episode.mkv")).unwrap(),
        b"episode"
    );
    assert_eq!(downloader.queue_stats().total_jobs, 1);
}

#[tokio::test]
async fn replace_policy_cancels_job_in_post_processing() {
    let (mut config, temp_dir) = test_config(2);
    config.download.duplicate_policy = DuplicatePolicy::Replace;
    let downloader = MediaDownloader::with_post_processor(
        config,
        FakePostProcessor::new(FakeBehavior::BlockUntilCancelled),
    )
    .unwrap();
    let server = MockServer::start().await;
    mount_file(&server, "/clip.mkv", b"clip".to_vec(), None).await;

    let url = format!("{}/clip.mkv", server.uri());
    let first = downloader
        .enqueue_download(&url, temp_dir.path(), None)
        .await
        .unwrap();
    wait_for_status(&downloader, &url, TaskStatus::Converting).await;

    let second = downloader
        .enqueue_download(&url, temp_dir.path(), None)
        .await
        .unwrap();
    assert_eq!(second.replaced, Some(first.job));

    // The old worker leaves post-processing and drops its token
    tokio::time::timeout(Duration::from_secs(5), async {
        while downloader
            .queue_state
            .active_downloads
            .lock()
            .await
            .contains_key(&first.job)
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let task = wait_for_task(&downloader, &url, |t| {
        t.job() == second.job && t.status == TaskStatus::Converting
    })
    .await;
    assert!(task.error_message.is_none());
    assert_eq!(
        std::fs::read(temp_dir.path().join("clip.mkv")).unwrap(),
        b"clip"
    );

    downloader.shutdown().await.unwrap();
}

#[tokio::test]
async fn replace_policy_drops_queued_job() {
    let (downloader, temp_dir) = create_replacing_downloader(1).await;
    let server = MockServer::start().await;
    mount_file(&server, "/busy.mp4", vec![0; 8], Some(Duration::from_millis(500))).await;
    mount_file(&server, "/next.mp4", vec![7; 8], None).await;

    let busy = format!("{}/busy.mp4", server.uri());
    let next = format!("{}/next.mp4", server.uri());
    downloader
        .enqueue_download(&busy, temp_dir.path(), None)
        .await
        .unwrap();
    wait_for_status(&downloader, &busy, TaskStatus::Downloading).await;

    let first = downloader
        .enqueue_download(&next, temp_dir.path(), None)
        .await
        .unwrap();
    let second = downloader
        .enqueue_download(&next, temp_dir.path(), None)
        .await
        .unwrap();
    assert_eq!(second.replaced, Some(first.job));
    assert_eq!(downloader.queue_state.queue.lock().await.len(), 1);

    let task = wait_for_terminal(&downloader, &next).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.job(), second.job);
}

#[tokio::test]
async fn terminal_url_can_be_queued_again() {
    let (downloader, temp_dir) = create_test_downloader(1).await;
    let server = MockServer::start().await;
    mount_file(&server, "/again.mp4", vec![1, 2, 3], None).await;

    let url = format!("{}/again.mp4", server.uri());
    let first = downloader
        .enqueue_download(&url, temp_dir.path(), None)
        .await
        .unwrap();
    assert_eq!(
        wait_for_terminal(&downloader, &url).await.status,
        TaskStatus::Completed
    );

    let second = downloader
        .enqueue_download(&url, temp_dir.path(), None)
        .await
        .unwrap();
    assert!(second.replaced.is_none());
    assert!(second.job > first.job);
    wait_for_task(&downloader, &url, |t| {
        t.job() == second.job && t.status.is_terminal()
    })
    .await;
}

#[tokio::test]
async fn malformed_url_is_rejected_before_queueing() {
    let (downloader, temp_dir) = create_test_downloader(1).await;

    let err = downloader
        .enqueue_download("not a url", temp_dir.path(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Transfer(TransferError::InvalidUrl { .. })
    ));

    let err = downloader
        .enqueue_download("http://example.com/", temp_dir.path(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Storage(StorageError::InvalidFileName { .. })
    ));
    assert!(downloader.progress_list().is_empty());
}

#[tokio::test]
async fn submit_resolves_inside_library() {
    let (downloader, _temp_dir) = create_test_downloader(1).await;
    let server = MockServer::start().await;
    mount_file(&server, "/lib.mp4", vec![5; 10], None).await;

    let url = format!("{}/lib.mp4", server.uri());
    downloader
        .submit(&url, "Shows/Season 1", None)
        .await
        .unwrap();
    let task = wait_for_terminal(&downloader, &url).await;

    let expected = downloader
        .get_config()
        .library_dir()
        .join("Shows/Season 1/lib.mp4");
    assert_eq!(task.output_path.as_deref(), Some(expected.as_path()));
}

#[tokio::test]
async fn submit_rejects_escape_from_library() {
    let (downloader, _temp_dir) = create_test_downloader(1).await;
    let err = downloader
        .submit("http://example.com/a.mp4", "../outside", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPath { .. }));
    assert!(downloader.progress_list().is_empty());
}

#[tokio::test]
async fn submit_rejects_existing_file() {
    let (downloader, _temp_dir) = create_test_downloader(1).await;
    let dir = downloader.get_config().library_dir().join("Movies");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("Film.mp4"), b"present").unwrap();

    let err = downloader
        .submit(
            "http://example.com/raw/Film_ImSM8O.mp4",
            "Movies",
            Some("Film (Raw).mp4".into()),
        )
        .await
        .unwrap_err();
    match err {
        Error::Scheduling(SchedulingError::FileExists { path }) => {
            assert_eq!(path, dir.join("Film.mp4"))
        }
        other => panic!("expected FileExists, got {other:?}"),
    }

    // Without a title the name comes from the URL
    let err = downloader
        .submit("http://example.com/raw/Film_ImSM8O.mp4", "Movies", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Scheduling(SchedulingError::FileExists { .. })
    ));
}

#[tokio::test]
async fn submit_reports_unreadable_destination() {
    let (downloader, _temp_dir) = create_test_downloader(1).await;
    let library = downloader.get_config().library_dir().clone();
    std::fs::create_dir_all(&library).unwrap();
    // "Movies" is a regular file, so the expected path cannot be inspected
    std::fs::write(library.join("Movies"), b"not a directory").unwrap();

    let err = downloader
        .submit("http://example.com/Film.mp4", "Movies", None)
        .await
        .unwrap_err();
    match err {
        Error::Storage(StorageError::Inspect { path, .. }) => {
            assert_eq!(path, library.join("Movies").join("Film.mp4"))
        }
        other => panic!("expected Inspect, got {other:?}"),
    }
    assert!(downloader.progress_list().is_empty());
}
