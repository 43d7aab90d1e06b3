use super::*;
use crate::downloader::test_helpers::{create_test_downloader, mount_file, wait_for_terminal};
use crate::types::TaskStatus;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt; // for oneshot
use wiremock::MockServer;

async fn test_app() -> (Router, Arc<MediaDownloader>, tempfile::TempDir) {
    let (downloader, temp_dir) = create_test_downloader(1).await;
    let downloader = Arc::new(downloader);
    let app = create_router(downloader.clone(), downloader.get_config());
    (app, downloader, temp_dir)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _downloader, _temp_dir) = test_app().await;

    let response = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["accepting"], true);
}

#[tokio::test]
async fn test_download_queues_into_library() {
    let (app, downloader, _temp_dir) = test_app().await;
    let server = MockServer::start().await;
    mount_file(&server, "/clip.mp4", vec![4; 32], None).await;
    let url = format!("{}/clip.mp4", server.uri());

    let response = app
        .oneshot(post_json(
            "/api/download",
            json!({ "url": url, "path": "Clips", "title": "My Clip.mp4" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["status"], "queued");
    assert_eq!(body["filename"], "My Clip.mp4");
    assert!(body["message"].as_str().unwrap().contains(&url));
    assert!(body.get("replaced").is_none());

    let task = wait_for_terminal(&downloader, &url).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(
        task.output_path
            .unwrap()
            .starts_with(downloader.get_config().library_dir().join("Clips"))
    );
}

#[tokio::test]
async fn test_download_resolves_against_downloader_library() {
    let (downloader, _temp_dir) = create_test_downloader(1).await;
    let downloader = Arc::new(downloader);
    let server = MockServer::start().await;
    mount_file(&server, "/own.mp4", vec![1; 16], None).await;
    let url = format!("{}/own.mp4", server.uri());

    // Router config only shapes the HTTP layers
    let mut router_config = Config::default();
    router_config.download.library_dir = "/nonexistent/other-library".into();
    router_config.api.cors_enabled = false;
    let app = create_router(downloader.clone(), Arc::new(router_config));

    let response = app
        .oneshot(post_json("/api/download", json!({ "url": url, "path": "Own" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let task = wait_for_terminal(&downloader, &url).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(
        task.output_path.unwrap(),
        downloader.get_config().library_dir().join("Own").join("own.mp4")
    );
}

#[tokio::test]
async fn test_download_rejects_path_escape() {
    let (app, downloader, _temp_dir) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/api/download",
            json!({ "url": "http://example.com/a.mp4", "path": "../../etc" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["code"], "invalid_path");
    assert!(downloader.progress_list().is_empty());
}

#[tokio::test]
async fn test_download_rejects_active_duplicate() {
    let (app, _downloader, _temp_dir) = test_app().await;
    let server = MockServer::start().await;
    mount_file(&server, "/slow.mp4", vec![0; 8], Some(Duration::from_secs(2))).await;
    let body = json!({ "url": format!("{}/slow.mp4", server.uri()), "path": "" });

    let first = app
        .clone()
        .oneshot(post_json("/api/download", body.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .oneshot(post_json("/api/download", body))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(second).await["error"]["code"], "already_active");
}

#[tokio::test]
async fn test_download_rejects_malformed_url() {
    let (app, _downloader, _temp_dir) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/api/download",
            json!({ "url": "not a url", "path": "" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "invalid_url");
}

#[tokio::test]
async fn test_progress_clear_and_stats() {
    let (app, downloader, _temp_dir) = test_app().await;
    let server = MockServer::start().await;
    mount_file(&server, "/done.mp4", vec![1; 16], None).await;
    let url = format!("{}/done.mp4", server.uri());

    downloader
        .submit(&url, "", None)
        .await
        .unwrap();
    wait_for_terminal(&downloader, &url).await;

    let response = app.clone().oneshot(get("/api/progress")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let progress = body_json(response).await;
    assert_eq!(progress[&url]["status"], "completed");
    assert_eq!(progress[&url]["progress_percentage"], 100.0);
    assert_eq!(progress[&url]["filename"], "done.mp4");

    let response = app.clone().oneshot(get("/api/queue/stats")).await.unwrap();
    let stats = body_json(response).await;
    assert_eq!(stats["total_jobs"], 1);
    assert_eq!(stats["by_status"]["completed"], 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/clear_progress")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = body_json(response).await;
    assert_eq!(cleared["removed_count"], 1);
    assert_eq!(
        cleared["message"],
        "Cleared 1 finished entries from progress list."
    );

    let response = app.oneshot(get("/api/progress")).await.unwrap();
    assert_eq!(body_json(response).await, json!({}));
}

#[tokio::test]
async fn test_openapi_endpoint() {
    let (app, _downloader, _temp_dir) = test_app().await;

    let response = app.oneshot(get("/api/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let spec = body_json(response).await;
    assert!(spec["paths"]["/api/download"].is_object());
}

#[tokio::test]
async fn test_cors_enabled() {
    let (downloader, _temp_dir) = create_test_downloader(1).await;
    let downloader = Arc::new(downloader);
    let mut config = (*downloader.get_config()).clone();
    config.api.cors_enabled = true;
    config.api.cors_origins = vec!["*".to_string()];
    let app = create_router(downloader, Arc::new(config));

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let (downloader, _temp_dir) = create_test_downloader(1).await;
    let downloader = Arc::new(downloader);
    let mut config = (*downloader.get_config()).clone();
    config.api.cors_enabled = false;
    let app = create_router(downloader, Arc::new(config));

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_spawn_api_server_method() {
    let (downloader, _temp_dir) = create_test_downloader(1).await;
    let api_handle = downloader.spawn_api_server();
    tokio::time::sleep(Duration::from_millis(100)).await;
    api_handle.abort();
}
