use super::*;
use crate::orchestrator::test_helpers::DaemonCall;
use serde_json::json;

#[tokio::test]
async fn submit_then_list() {
    let app = test_app(|_| {}).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/owners/u1/tasks",
            json!({ "locator": "magnet:?xt=urn:btih:ABCDEF&dn=Film", "category": "kino" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["job_id"], "meta1");
    assert!(body["task_id"].is_string());

    let (status, body) = send(&app, get("/api/v1/owners/u1/tasks")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta1"]["stage"], "metadata_fetch");
    assert_eq!(body["meta1"]["category"], "movies");
    assert_eq!(body["meta1"]["content_hash"], "abcdef");
    assert_eq!(body["meta1"]["display_name"], "Film");
}

#[tokio::test]
async fn submit_without_locator_is_unprocessable() {
    let app = test_app(|_| {}).await;

    let (status, body) = send(
        &app,
        post_json("/api/v1/owners/u1/tasks", json!({ "locator": "hello" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "missing_locator");
}

#[tokio::test]
async fn unauthorized_owner_is_forbidden() {
    let app = test_app(|config| config.owners = vec!["u1".into()]).await;

    let (status, body) = send(&app, get("/api/v1/owners/u2/tasks")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn unknown_category_name_is_rejected() {
    let app = test_app(|_| {}).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/owners/u1/tasks/meta1/category",
            json!({ "category": "music" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "invalid_category");
    assert!(body["error"]["message"].as_str().unwrap().contains("music"));
}

#[tokio::test]
async fn category_for_missing_task_is_not_found() {
    let app = test_app(|_| {}).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/owners/u1/tasks/nope/category",
            json!({ "category": "series" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["details"]["job_id"], "nope");
}

#[tokio::test]
async fn cancel_is_accepted() {
    let app = test_app(|_| {}).await;
    let (_, body) = send(
        &app,
        post_json(
            "/api/v1/owners/u1/tasks",
            json!({ "locator": "magnet:?xt=urn:btih:ab" }),
        ),
    )
    .await;
    let job = body["job_id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/owners/u1/tasks/{job}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(app
        .daemon
        .calls()
        .contains(&DaemonCall::Remove(job.as_str().into())));
}
