//! Admin replay API integration tests using axum's test utilities.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use munia_core::auth::{Caller, Role, StaticTokenProvider};
use munia_core::model::action::{ActionPayload, ReplayAction};
use munia_core::model::session::ReplaySession;
use munia_core::query::ReplayEngine;
use munia_core::storage::duckdb::DuckDbStorage;
use munia_core::storage::ReplayStorage;

fn create_test_engine() -> (Arc<ReplayEngine>, Arc<DuckDbStorage>) {
    let storage = Arc::new(DuckDbStorage::open_in_memory().unwrap());
    let identity = StaticTokenProvider::new()
        .with_token("root-token", Caller::new("root", Role::Admin))
        .with_token("alice-token", Caller::new("alice", Role::Member));
    let engine = Arc::new(ReplayEngine::new(storage.clone(), Arc::new(identity)));
    (engine, storage)
}

async fn seed(storage: &DuckDbStorage, id: &str, started_at: &str, actions: &[ReplayAction]) {
    storage
        .create_or_continue_session(&ReplaySession {
            id: id.to_string(),
            user_id: Some("alice".to_string()),
            started_at: started_at.to_string(),
            ended_at: None,
        })
        .await
        .unwrap();
    storage.append_actions(id, actions).await.unwrap();
}

async fn get(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_admin_health_endpoint() {
    let (engine, _) = create_test_engine();
    let app = munia_admin::router(engine);

    let (status, body) = get(&app, "/admin/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "ok");
}

#[tokio::test]
async fn test_admin_fetches_stored_log() {
    let (engine, storage) = create_test_engine();
    seed(
        &storage,
        "s1",
        "2026-01-01T00:00:00.000000Z",
        &[
            ReplayAction::new(1, &ActionPayload::route("/")).unwrap(),
            ReplayAction::new(2, &ActionPayload::route("/profile")).unwrap(),
        ],
    )
    .await;
    let app = munia_admin::router(engine);

    let (status, body) = get(&app, "/admin/api/replay/sessions/s1", Some("root-token")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json(&body),
        serde_json::json!({
            "id": "s1",
            "actions": [
                {"t": "route", "ts": 1, "d": {"path": "/"}},
                {"t": "route", "ts": 2, "d": {"path": "/profile"}}
            ]
        })
    );
}

#[tokio::test]
async fn test_admin_unknown_session_is_not_found() {
    let (engine, _) = create_test_engine();
    let app = munia_admin::router(engine);

    let (status, body) = get(&app, "/admin/api/replay/sessions/zzz", Some("root-token")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body), serde_json::json!({"error": "not_found"}));
}

#[tokio::test]
async fn test_non_admin_gets_identical_forbidden_responses() {
    let (engine, storage) = create_test_engine();
    seed(
        &storage,
        "s1",
        "2026-01-01T00:00:00.000000Z",
        &[ReplayAction::new(1, &ActionPayload::route("/")).unwrap()],
    )
    .await;
    let app = munia_admin::router(engine);

    let (existing_status, existing) =
        get(&app, "/admin/api/replay/sessions/s1", Some("alice-token")).await;
    let (missing_status, missing) =
        get(&app, "/admin/api/replay/sessions/zzz", Some("alice-token")).await;
    let (anon_status, anon) = get(&app, "/admin/api/replay/sessions/s1", None).await;

    assert_eq!(existing_status, StatusCode::FORBIDDEN);
    assert_eq!(missing_status, StatusCode::FORBIDDEN);
    assert_eq!(anon_status, StatusCode::FORBIDDEN);
    assert_eq!(existing, missing);
    assert_eq!(existing, anon);
    assert_eq!(json(&existing), serde_json::json!({"error": "forbidden"}));
}

#[tokio::test]
async fn test_session_index_newest_first() {
    let (engine, storage) = create_test_engine();
    seed(&storage, "old", "2026-01-01T00:00:00.000000Z", &[]).await;
    seed(
        &storage,
        "new",
        "2026-03-01T00:00:00.000000Z",
        &[
            ReplayAction::new(5, &ActionPayload::click("#like")).unwrap(),
            ReplayAction::new(6, &ActionPayload::route("/feed")).unwrap(),
        ],
    )
    .await;
    seed(&storage, "mid", "2026-02-01T00:00:00.000000Z", &[]).await;
    let app = munia_admin::router(engine);

    let (status, body) = get(&app, "/admin/api/replay/sessions", Some("root-token")).await;
    assert_eq!(status, StatusCode::OK);

    let index = json(&body);
    let ids: Vec<&str> = index["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["new", "mid", "old"]);
    assert_eq!(index["sessions"][0]["actionCount"], 2);
    assert_eq!(index["sessions"][0]["startedAt"], "2026-03-01T00:00:00.000000Z");
    assert!(index["sessions"][0]["endedAt"].is_null());
}

#[tokio::test]
async fn test_session_index_pages_with_limit_and_offset() {
    let (engine, storage) = create_test_engine();
    for day in 1..=5 {
        seed(&storage, &format!("d{day}"), &format!("2026-01-0{day}T00:00:00.000000Z"), &[]).await;
    }
    let app = munia_admin::router(engine);

    let (status, body) = get(
        &app,
        "/admin/api/replay/sessions?limit=2&offset=2",
        Some("root-token"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let page = json(&body);
    let ids: Vec<&str> = page["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["d3", "d2"]);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["offset"], 2);
    assert_eq!(page["hasMore"], true);

    let (_, body) = get(
        &app,
        "/admin/api/replay/sessions?limit=2&offset=4",
        Some("root-token"),
    )
    .await;
    let last = json(&body);
    assert_eq!(last["sessions"].as_array().unwrap().len(), 1);
    assert_eq!(last["sessions"][0]["id"], "d1");
    assert_eq!(last["hasMore"], false);
}

#[tokio::test]
async fn test_session_index_requires_admin() {
    let (engine, _) = create_test_engine();
    let app = munia_admin::router(engine);

    let (status, body) = get(&app, "/admin/api/replay/sessions", Some("alice-token")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json(&body)["error"], "forbidden");
}
