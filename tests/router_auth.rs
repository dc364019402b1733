//! Router tests that need no database: every API route demands an
//! authenticated principal before touching storage.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use tower::ServiceExt;

use loadflow::config::Settings;
use loadflow::repository::PgPool;
use loadflow::server::{create_router, AppState};

fn test_settings() -> Settings {
    Settings {
        database_url: "postgres://localhost:1/never_connected".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        worker_count: 1,
        lease_seconds: 300,
        data_dir: std::env::temp_dir(),
        task_channel: "pipeline_run_tasks".to_string(),
        session_secret: String::new(),
        pool_size: 1,
    }
}

/// The pool is lazy: building state never opens a connection, so routes
/// that reject before storage access are testable without a server.
fn test_app() -> axum::Router {
    let settings = Arc::new(test_settings());
    let pool = PgPool::new(&settings.database_url, 1).unwrap();
    create_router(AppState::new(settings, pool))
}

async fn assert_unauthorized(app: axum::Router, method: Method, uri: &str) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(
        json["error"].as_str().unwrap().contains("session"),
        "error body for {uri}: {json}"
    );
}

#[tokio::test]
async fn test_reads_require_principal() {
    assert_unauthorized(test_app(), Method::GET, "/api/operations").await;
    assert_unauthorized(test_app(), Method::GET, "/api/actions").await;
    assert_unauthorized(test_app(), Method::GET, "/api/pipeline-runs/collection").await;
    assert_unauthorized(test_app(), Method::GET, "/api/pipeline-run-tasks/1").await;
    assert_unauthorized(test_app(), Method::GET, "/api/task-status?prTaskId=1").await;
    assert_unauthorized(test_app(), Method::GET, "/api/source-tables/1").await;
}

#[tokio::test]
async fn test_commands_require_principal() {
    assert_unauthorized(test_app(), Method::POST, "/api/run-task/1/1").await;
    assert_unauthorized(test_app(), Method::POST, "/api/run-all/1/1").await;
    assert_unauthorized(test_app(), Method::POST, "/api/reset-task/1/1").await;
    assert_unauthorized(test_app(), Method::POST, "/api/pickup/1").await;
    assert_unauthorized(test_app(), Method::DELETE, "/api/source-tables?run_id=1&st_oid=1").await;
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/api/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// With a principal present, a non-numeric path id is rejected during
/// extraction, before any storage access.
#[tokio::test]
async fn test_non_numeric_run_id_rejected() {
    use loadflow::server::{principal_from_headers, USER_HEADER};

    let app = test_app().layer(axum::middleware::from_fn(principal_from_headers));
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/run-task/abc/1")
                .header(USER_HEADER, "rcollins")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
