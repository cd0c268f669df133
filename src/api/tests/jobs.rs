use super::*;
use crate::types::{JobId, Status};

fn post_job(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn create(app: &Router, body: &str) -> JobId {
    let response = send(app.clone(), post_job(body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    json["jobId"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn create_job_rejects_bad_input_with_400() {
    let (downloader, _dir) = create_test_downloader(test_helpers::SUCCESS_SCRIPT).await;
    let app = router_for(&downloader);

    for body in [
        r#"{"url":""}"#,
        r#"{"url":"ftp://example.com/v1"}"#,
        r#"{"url":"https://example.com/v1","format":"no spaces allowed"}"#,
        r#"{"format":"best"}"#,
        "not json",
    ] {
        let response = send(app.clone(), post_job(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "invalid_request");
    }

    assert!(downloader.list_jobs().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn created_job_succeeds_and_reports_output_path() {
    let (downloader, _dir) = create_test_downloader(test_helpers::SUCCESS_SCRIPT).await;
    let app = router_for(&downloader);

    let id = create(&app, r#"{"url":"https://example.com/v1","format":"best"}"#).await;
    test_helpers::wait_for_status(&downloader, id, Status::Succeeded).await;

    let response = fetch(app, &format!("/jobs/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["id"], id.to_string().as_str());
    assert_eq!(json["status"], "succeeded");
    assert_eq!(json["format"], "best");
    assert_eq!(json["progress"]["percent"], 100.0);
    assert!(json["outputPath"].as_str().unwrap().ends_with("out.mp4"));
    assert!(json.get("error").is_none());
}

#[tokio::test]
async fn format_defaults_to_best() {
    let (downloader, _dir) = create_test_downloader(test_helpers::SLOW_SCRIPT).await;
    let app = router_for(&downloader);

    let id = create(&app, r#"{"url":"https://example.com/v1"}"#).await;
    assert_eq!(downloader.job(id).unwrap().format, "best");
    downloader.cancel_job(id).unwrap();
}

#[tokio::test]
async fn unknown_job_is_404() {
    let (downloader, _dir) = create_test_downloader(test_helpers::SUCCESS_SCRIPT).await;
    let app = router_for(&downloader);

    let response = fetch(app.clone(), &format!("/jobs/{}", JobId::new())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["code"], "job_not_found");

    let response = fetch(app.clone(), "/jobs/not-a-job-id").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(app, delete(&format!("/jobs/{}", JobId::new()))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[cfg(unix)]
#[tokio::test]
async fn delete_cancels_and_is_idempotent() {
    let (downloader, _dir) = create_test_downloader(test_helpers::SLOW_SCRIPT).await;
    let app = router_for(&downloader);

    let id = create(&app, r#"{"url":"https://example.com/v1"}"#).await;
    test_helpers::wait_for_status(&downloader, id, Status::Running).await;

    for _ in 0..2 {
        let response = send(app.clone(), delete(&format!("/jobs/{id}"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "cancelled");
    }
}

#[tokio::test]
async fn list_jobs_returns_newest_first() {
    let (downloader, _dir) = create_test_downloader(test_helpers::SLOW_SCRIPT).await;
    let app = router_for(&downloader);

    let first = create(&app, r#"{"url":"https://example.com/a"}"#).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = create(&app, r#"{"url":"https://example.com/b"}"#).await;

    let json = json_body(fetch(app, "/jobs").await).await;
    let ids: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|job| job["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![second.to_string(), first.to_string()]);

    downloader.cancel_job(first).unwrap();
    downloader.cancel_job(second).unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn file_is_409_until_succeeded() {
    let (downloader, _dir) = create_test_downloader(test_helpers::SLOW_SCRIPT).await;
    let app = router_for(&downloader);

    let id = create(&app, r#"{"url":"https://example.com/v1"}"#).await;
    let response = fetch(app, &format!("/jobs/{id}/file")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"]["code"], "not_ready");

    downloader.cancel_job(id).unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn file_streams_artifact_with_headers() {
    let (downloader, _dir) = create_test_downloader(test_helpers::SUCCESS_SCRIPT).await;
    let app = router_for(&downloader);

    let id = create(&app, r#"{"url":"https://example.com/v1"}"#).await;
    test_helpers::wait_for_status(&downloader, id, Status::Succeeded).await;

    let response = fetch(app.clone(), &format!("/jobs/{id}/file")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "video/mp4");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"out.mp4\""
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"media bytes");

    // Served repeatedly unless one-time downloads are enabled
    let response = fetch(app, &format!("/jobs/{id}/file")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[cfg(unix)]
#[tokio::test]
async fn one_time_file_is_removed_after_download() {
    let (downloader, _dir) =
        test_helpers::create_test_downloader_with(test_helpers::SUCCESS_SCRIPT, |c| {
            c.jobs.delete_after_download = true
        })
        .await;
    let downloader = Arc::new(downloader);
    let app = router_for(&downloader);

    let id = create(&app, r#"{"url":"https://example.com/v1"}"#).await;
    let info = test_helpers::wait_for_status(&downloader, id, Status::Succeeded).await;
    let path = info.output_path.unwrap();

    let response = fetch(app.clone(), &format!("/jobs/{id}/file")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"media bytes");
    assert!(!path.exists());

    let response = fetch(app, &format!("/jobs/{id}/file")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(response).await["error"]["code"],
        "artifact_missing"
    );
}
