//! Ingest API integration tests using axum's test utilities.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use munia_core::auth::{Caller, Role, StaticTokenProvider};
use munia_core::query::ReplayEngine;
use munia_core::storage::duckdb::DuckDbStorage;

fn create_test_engine() -> Arc<ReplayEngine> {
    let storage = Arc::new(DuckDbStorage::open_in_memory().unwrap());
    let identity = StaticTokenProvider::new()
        .with_token("alice-token", Caller::new("alice", Role::Member))
        .with_token("bob-token", Caller::new("bob", Role::Member))
        .with_token("root-token", Caller::new("root", Role::Admin));
    Arc::new(ReplayEngine::new(storage, Arc::new(identity)))
}

fn post(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_rest_health() {
    let app = munia_rest::router(create_test_engine());

    let (status, json) = send(
        &app,
        Request::builder().uri("/v1/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_append_actions_endpoint() {
    let engine = create_test_engine();
    let app = munia_rest::router(engine.clone());

    let batch = serde_json::json!({
        "actions": [
            {"t": "route", "ts": 1, "d": {"path": "/"}},
            {"t": "cmd", "ts": 2, "d": {"n": "like-post", "a": {"postId": 7}}},
            {"t": "route", "ts": 3, "d": {"path": "/profile"}}
        ]
    });
    let (status, json) = send(
        &app,
        post("/v1/replay/sessions/s1/actions", Some("alice-token"), batch),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "s1");
    assert_eq!(json["accepted"], 3);

    let admin = Caller::new("root", Role::Admin);
    let stored = engine.session_actions(Some(&admin), "s1").await.unwrap();
    let kinds: Vec<&str> = stored.actions.iter().map(|a| a.kind.as_str()).collect();
    assert_eq!(kinds, vec!["route", "cmd", "route"]);
}

#[tokio::test]
async fn test_batches_accumulate_in_order() {
    let engine = create_test_engine();
    let app = munia_rest::router(engine.clone());

    for (ts, path) in [(10, "/a"), (20, "/b")] {
        let batch = serde_json::json!({"actions": [{"t": "route", "ts": ts, "d": {"path": path}}]});
        let (status, _) = send(
            &app,
            post("/v1/replay/sessions/s-acc/actions", Some("alice-token"), batch),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let admin = Caller::new("root", Role::Admin);
    let stored = engine.session_actions(Some(&admin), "s-acc").await.unwrap();
    let stamps: Vec<u64> = stored.actions.iter().map(|a| a.timestamp).collect();
    assert_eq!(stamps, vec![10, 20]);
}

#[tokio::test]
async fn test_append_requires_sign_in() {
    let app = munia_rest::router(create_test_engine());
    let batch = serde_json::json!({"actions": []});

    let (status, json) = send(&app, post("/v1/replay/sessions/s1/actions", None, batch.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "forbidden");

    let (status, _) = send(
        &app,
        post("/v1/replay/sessions/s1/actions", Some("bogus"), batch),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_foreign_session_is_forbidden() {
    let app = munia_rest::router(create_test_engine());
    let batch = serde_json::json!({"actions": [{"t": "route", "ts": 1, "d": {"path": "/"}}]});

    let (status, _) = send(
        &app,
        post("/v1/replay/sessions/mine/actions", Some("alice-token"), batch.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        &app,
        post("/v1/replay/sessions/mine/actions", Some("bob-token"), batch),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "forbidden");
}

#[tokio::test]
async fn test_invalid_action_is_rejected() {
    let app = munia_rest::router(create_test_engine());
    let batch = serde_json::json!({"actions": [{"t": "", "ts": 1, "d": {}}]});

    let (status, json) = send(
        &app,
        post("/v1/replay/sessions/s1/actions", Some("alice-token"), batch),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_close_session_endpoint() {
    let app = munia_rest::router(create_test_engine());
    let batch = serde_json::json!({"actions": [{"t": "route", "ts": 1, "d": {"path": "/"}}]});
    send(
        &app,
        post("/v1/replay/sessions/s-close/actions", Some("alice-token"), batch.clone()),
    )
    .await;

    let (status, first) = send(
        &app,
        post("/v1/replay/sessions/s-close/close", Some("alice-token"), serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["id"], "s-close");
    assert!(first["endedAt"].is_string());

    // Closing twice keeps the original end time.
    let (status, second) = send(
        &app,
        post("/v1/replay/sessions/s-close/close", Some("alice-token"), serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["endedAt"], second["endedAt"]);

    // A closed session accepts no more actions.
    let (status, _) = send(
        &app,
        post("/v1/replay/sessions/s-close/actions", Some("alice-token"), batch),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_close_unknown_session() {
    let app = munia_rest::router(create_test_engine());

    let (status, json) = send(
        &app,
        post("/v1/replay/sessions/nope/close", Some("alice-token"), serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}
