use super::*;
use crate::harvester::test_helpers::{TestHarvester, create_test_harvester, issn_csv};
use crate::workflow::testing::Script;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

mod batches;

const BOUNDARY: &str = "scopus-harvester-test-boundary";

/// Test harvester plus the router serving it
async fn test_app() -> (TestHarvester, Router) {
    test_app_with(|_| {}).await
}

async fn test_app_with(configure: impl FnOnce(&mut Config)) -> (TestHarvester, Router) {
    let t = create_test_harvester(Script::default(), true).await;
    let mut config = (*t.harvester.get_config()).clone();
    configure(&mut config);
    let app = create_router(Arc::new(t.harvester.clone()), Arc::new(config));
    (t, app)
}

/// Multipart request uploading `bytes` as field `file`
fn upload_request(filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/batches")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_api_server_spawns() {
    let t = create_test_harvester(Script::default(), true).await;
    let mut config = (*t.harvester.get_config()).clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();

    let handle = tokio::spawn(start_api_server(
        Arc::new(t.harvester.clone()),
        Arc::new(config),
    ));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert!(!handle.is_finished());
    handle.abort();
}

#[tokio::test]
async fn test_cors_headers_follow_config() {
    let (_t, app) = test_app().await;
    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.headers().contains_key("access-control-allow-origin"));

    let (_t, app) = test_app_with(|c| c.api.cors_enabled = false).await;
    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(!response.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_api_key_guards_every_route() {
    let (_t, app) = test_app_with(|c| c.api.api_key = Some("operator".into())).await;

    let (status, body) = send(&app, get("/batches")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let request = Request::builder()
        .uri("/batches")
        .header("X-Api-Key", "operator")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}
