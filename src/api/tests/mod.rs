use super::*;
use crate::downloader::test_helpers;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use std::time::Duration;
use tower::ServiceExt;

mod jobs;

/// Test downloader wrapped in Arc, backed by the given shell script
async fn create_test_downloader(script: &str) -> (Arc<MediaDownloader>, tempfile::TempDir) {
    let (downloader, temp_dir) = test_helpers::create_test_downloader(script).await;
    (Arc::new(downloader), temp_dir)
}

/// Router with the downloader's own config
fn router_for(downloader: &Arc<MediaDownloader>) -> Router {
    create_router(downloader.clone(), downloader.get_config())
}

/// Router with a modified copy of the downloader's config
fn router_with(downloader: &Arc<MediaDownloader>, adjust: impl FnOnce(&mut Config)) -> Router {
    let mut config = (*downloader.get_config()).clone();
    adjust(&mut config);
    create_router(downloader.clone(), Arc::new(config))
}

async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

async fn fetch(app: Router, uri: &str) -> Response {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn json_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn api_server_spawns_on_free_port() {
    let (downloader, _temp_dir) = create_test_downloader(test_helpers::SUCCESS_SCRIPT).await;

    let mut config = (*downloader.get_config()).clone();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let downloader = downloader.clone();
        async move { start_api_server(downloader, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server exited early");
    api_handle.abort();
}

#[tokio::test]
async fn cors_headers_present_when_enabled() {
    let (downloader, _temp_dir) = create_test_downloader(test_helpers::SUCCESS_SCRIPT).await;
    let app = router_with(&downloader, |c| {
        c.server.api.cors_enabled = true;
        c.server.api.cors_origins = vec!["*".to_string()];
    });

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = send(app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn cors_headers_absent_when_disabled() {
    let (downloader, _temp_dir) = create_test_downloader(test_helpers::SUCCESS_SCRIPT).await;
    let app = router_with(&downloader, |c| c.server.api.cors_enabled = false);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = send(app, request).await;

    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}

#[tokio::test]
async fn api_key_protects_jobs_but_not_health() {
    let (downloader, _temp_dir) = create_test_downloader(test_helpers::SUCCESS_SCRIPT).await;
    let app = router_with(&downloader, |c| {
        c.server.api.api_key = Some("s3cret".to_string());
    });

    assert_eq!(fetch(app.clone(), "/health").await.status(), StatusCode::OK);
    assert_eq!(
        fetch(app.clone(), "/jobs").await.status(),
        StatusCode::UNAUTHORIZED
    );

    let request = Request::builder()
        .uri("/jobs")
        .header("X-Api-Key", "s3cret")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(app, request).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn swagger_ui_can_be_disabled() {
    let (downloader, _temp_dir) = create_test_downloader(test_helpers::SUCCESS_SCRIPT).await;

    let enabled = router_with(&downloader, |c| c.server.api.swagger_ui = true);
    assert_eq!(
        fetch(enabled, "/api-docs/openapi.json").await.status(),
        StatusCode::OK
    );

    let disabled = router_with(&downloader, |c| c.server.api.swagger_ui = false);
    assert_eq!(
        fetch(disabled, "/api-docs/openapi.json").await.status(),
        StatusCode::NOT_FOUND
    );
}
