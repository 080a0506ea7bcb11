use super::*;
use crate::Config;
use crate::orchestrator::test_helpers::{
    MemoryKv, MockClassifier, MockDaemon, RecordingSink, test_config,
};
use crate::orchestrator::{Components, Orchestrator};
use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

mod tasks;

struct TestApp {
    orchestrator: Orchestrator,
    daemon: Arc<MockDaemon>,
    _dir: tempfile::TempDir,
}

async fn test_app(configure: impl FnOnce(&mut Config)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    configure(&mut config);
    let daemon = Arc::new(MockDaemon::default());

    let orchestrator = Orchestrator::with_components(
        config,
        Components {
            daemon: daemon.clone(),
            classifier: Arc::new(MockClassifier::default()),
            kv: Arc::new(MemoryKv::default()),
            sink: Arc::new(RecordingSink::default()),
        },
    )
    .await
    .unwrap();

    TestApp {
        orchestrator,
        daemon,
        _dir: dir,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = create_router(app.orchestrator.clone())
        .oneshot(request)
        .await
        .unwrap();
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

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_version() {
    let app = test_app(|_| {}).await;

    let (status, body) = send(&app, get("/api/v1/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["dropped_notifications"], 0);
}

#[tokio::test]
async fn routes_live_under_api_prefix() {
    let app = test_app(|_| {}).await;
    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_key_guards_every_route() {
    let app = test_app(|config| config.api.api_key = Some("k3y".to_string())).await;

    let (status, body) = send(&app, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let request = Request::builder()
        .uri("/api/v1/health")
        .header("X-Api-Key", "k3y")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn active_report_without_jobs() {
    let app = test_app(|_| {}).await;

    let (status, body) = send(&app, get("/api/v1/active")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"], "No active tasks.");
}

#[tokio::test]
async fn api_server_spawns_on_free_port() {
    let app = test_app(|config| {
        config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    })
    .await;

    let handle = spawn_api_server(&app.orchestrator).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());
    handle.abort();
}

#[tokio::test]
async fn disabled_api_is_not_spawned() {
    let app = test_app(|config| config.api.enabled = false).await;
    assert!(spawn_api_server(&app.orchestrator).is_none());
}
