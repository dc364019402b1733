//! End-to-end pipeline tests against a real PostgreSQL database.
//!
//! Requires `LOADFLOW_TEST_DATABASE_URL` pointing at a throwaway database;
//! the test drops and recreates the public schema. Skipped when unset.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tower::ServiceExt;
use uuid::Uuid;

use loadflow::config::Settings;
use loadflow::models::TaskStatus;
use loadflow::notify::Publisher;
use loadflow::registry;
use loadflow::repository::{PgPool, RunRepository, TaskRepository, UserRepository};
use loadflow::schema::{pipeline_run_tasks, pipeline_runs, user_roles, users};
use loadflow::server::{create_router, principal_from_headers, AppState, USER_HEADER};

const ENV_KEY: &str = "LOADFLOW_TEST_DATABASE_URL";

struct Harness {
    pool: PgPool,
    settings: Arc<Settings>,
    url: String,
}

async fn setup() -> Option<Harness> {
    let Ok(url) = std::env::var(ENV_KEY) else {
        eprintln!("{ENV_KEY} not set, skipping postgres integration test");
        return None;
    };

    let settings = Arc::new(Settings {
        database_url: url.clone(),
        host: "127.0.0.1".to_string(),
        port: 0,
        worker_count: 1,
        lease_seconds: 60,
        data_dir: std::env::temp_dir().join(format!("loadflow-test-{}", std::process::id())),
        task_channel: "pipeline_run_tasks".to_string(),
        session_secret: String::new(),
        pool_size: 4,
    });

    let pool = PgPool::new(&url, 4).expect("pool");

    // Fresh schema per test run.
    {
        let mut conn = pool.get().await.expect("conn");
        diesel::sql_query("DROP SCHEMA public CASCADE")
            .execute(&mut conn)
            .await
            .expect("drop schema");
        diesel::sql_query("CREATE SCHEMA public")
            .execute(&mut conn)
            .await
            .expect("create schema");
    }
    loadflow::db_build::build(&url).await.expect("bootstrap");

    Some(Harness {
        pool,
        settings,
        url,
    })
}

async fn insert_admin(pool: &PgPool, username: &str) -> i64 {
    let mut conn = pool.get().await.unwrap();
    let user_id: i64 = diesel::insert_into(users::table)
        .values((
            users::username.eq(username),
            users::password_hash.eq("x"),
            users::full_name.eq("Test Admin"),
        ))
        .returning(users::user_id)
        .get_result(&mut conn)
        .await
        .unwrap();
    diesel::insert_into(user_roles::table)
        .values((user_roles::user_id.eq(user_id), user_roles::role.eq("admin")))
        .execute(&mut conn)
        .await
        .unwrap();
    user_id
}

async fn insert_run(pool: &PgPool, stage: &str) -> i64 {
    let mut conn = pool.get().await.unwrap();
    diesel::insert_into(pipeline_runs::table)
        .values((
            pipeline_runs::data_source_id.eq(1_i64),
            pipeline_runs::record_date.eq(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            pipeline_runs::workflow_operation.eq(stage),
        ))
        .returning(pipeline_runs::run_id)
        .get_result(&mut conn)
        .await
        .unwrap()
}

async fn insert_template_tasks(pool: &PgPool, run_id: i64) -> Vec<i64> {
    let mut conn = pool.get().await.unwrap();
    let mut ids = Vec::new();
    for (order, task_id) in registry::RUN_TEMPLATE.iter().enumerate() {
        let id: i64 = diesel::insert_into(pipeline_run_tasks::table)
            .values((
                pipeline_run_tasks::run_id.eq(run_id),
                pipeline_run_tasks::task_id.eq(task_id),
                pipeline_run_tasks::task_order.eq(order as i32 + 1),
            ))
            .returning(pipeline_run_tasks::pr_task_id)
            .get_result(&mut conn)
            .await
            .unwrap();
        ids.push(id);
    }
    ids
}

fn router(harness: &Harness) -> axum::Router {
    create_router(AppState::new(harness.settings.clone(), harness.pool.clone()))
        .layer(axum::middleware::from_fn(principal_from_headers))
}

async fn json_request(
    app: axum::Router,
    method: Method,
    uri: &str,
    form_body: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_HEADER, "admin_test");
    let body = match form_body {
        Some(form) => {
            builder = builder.header(
                header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            );
            Body::from(form.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_pipeline_end_to_end() {
    let Some(harness) = setup().await else {
        return;
    };

    let user_id = insert_admin(&harness.pool, "admin_test").await;
    let run_id = insert_run(&harness.pool, "collection").await;
    let task_ids = insert_template_tasks(&harness.pool, run_id).await;

    let users_repo = UserRepository::new(harness.pool.clone());
    let user = users_repo.by_username("admin_test").await.unwrap().unwrap();
    assert!(user.is_admin());
    assert_eq!(user.user_id, user_id);

    let tasks_repo = TaskRepository::new(harness.pool.clone());

    // Subscribe to task-change notifications before any status writes.
    let publisher = Publisher::new(&harness.url, "pipeline_run_tasks");
    let mut subscription = publisher.subscribe(run_id.to_string()).await;
    tokio::time::sleep(Duration::from_millis(500)).await; // LISTEN settles

    // Scenario: run the first task (system) over the API.
    let scan_task = task_ids[0];
    let (status, body) = json_request(
        router(&harness),
        Method::POST,
        &format!("/api/run-task/{run_id}/{scan_task}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["success"],
        format!("Scheduled {scan_task}"),
        "body: {body}"
    );
    assert_eq!(
        tasks_repo.status(scan_task).await.unwrap(),
        Some(TaskStatus::Scheduled)
    );

    // A job exists with the right envelope and run_next=false.
    let queue = loadflow::job_queue::JobQueue::new(harness.pool.clone(), 60);
    let job = queue.claim_next(Uuid::new_v4()).await.unwrap().unwrap();
    assert_eq!(job.envelope.pr_task_id, scan_task);
    assert_eq!(job.envelope.run_id, run_id);
    assert!(!job.envelope.run_next);

    // While a task occupies the in-flight slot, starting another conflicts.
    let second = task_ids[1];
    let (status, body) = json_request(
        router(&harness),
        Method::POST,
        &format!("/api/run-task/{run_id}/{second}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Task already running");
    assert_eq!(
        tasks_repo.status(second).await.unwrap(),
        Some(TaskStatus::Waiting)
    );
    assert_eq!(tasks_repo.active_count(run_id).await.unwrap(), 1);

    // Drive the claimed task through its legal arcs.
    tasks_repo
        .set_status(scan_task, TaskStatus::Running, None)
        .await
        .unwrap();
    tasks_repo
        .set_status(scan_task, TaskStatus::Complete, Some("2 source files present"))
        .await
        .unwrap();
    queue.delete(job.job_id).await.unwrap();

    let record = tasks_repo.get(scan_task).await.unwrap().unwrap();
    assert_eq!(record.task_status, TaskStatus::Complete);
    assert!(record.task_complete);
    assert!(record.task_start.is_some());
    assert!(record.task_completed.is_some());

    // Illegal arc is rejected and leaves the row untouched.
    let err = tasks_repo
        .set_status(scan_task, TaskStatus::Running, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("illegal task transition"));

    // The status writes fired LISTEN/NOTIFY payloads carrying the run id.
    let payload = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("notification within 5s")
        .expect("subscription alive");
    assert_eq!(payload, run_id.to_string());
    subscription.close().await;
    assert!(!publisher.has_listener().await);

    // Reset: back to Waiting with timestamps and message cleared.
    let engine_state = AppState::new(harness.settings.clone(), harness.pool.clone());
    let reset = engine_state
        .engine
        .reset_task(&user, run_id, scan_task)
        .await;
    assert!(reset.is_ok());
    let record = tasks_repo.get(scan_task).await.unwrap().unwrap();
    assert_eq!(record.task_status, TaskStatus::Waiting);
    assert!(record.task_start.is_none());
    assert!(record.task_completed.is_none());
    assert!(record.task_message.is_none());

    // Run-all carries the chain intent into the queued job.
    let (status, body) = json_request(
        router(&harness),
        Method::POST,
        &format!("/api/run-all/{run_id}/{scan_task}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["success"], format!("Scheduled {scan_task}"));
    let chain_job = queue.claim_next(Uuid::new_v4()).await.unwrap().unwrap();
    assert_eq!(chain_job.envelope.pr_task_id, scan_task);
    assert!(chain_job.envelope.run_next);

    // Park the chain again so later stages see an idle run.
    tasks_repo
        .set_status(scan_task, TaskStatus::Running, None)
        .await
        .unwrap();
    tasks_repo
        .set_status(scan_task, TaskStatus::Complete, None)
        .await
        .unwrap();
    queue.delete(chain_job.job_id).await.unwrap();

    // Source-table CRUD over the form surface.
    let (status, body) = json_request(
        router(&harness),
        Method::POST,
        "/api/source-tables",
        Some(&format!(
            "run_id={run_id}&table_name=ACCOUNTS&file_id=F101&file_name=accounts.csv\
             &delimiter=%2C&qualified=on&analyze=on&load=on&collect_type=download"
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    let st_oid = body["st_oid"].as_i64().unwrap();
    assert_eq!(body["rows_affected"], 1);

    // Excel without a sub table is a bad request...
    let (status, body) = json_request(
        router(&harness),
        Method::PATCH,
        "/api/source-tables",
        Some(&format!(
            "run_id={run_id}&st_oid={st_oid}&table_name=ACCOUNTS&file_id=F101\
             &file_name=accounts.xlsx&collect_type=download"
        )),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Sub Table must be not null");

    // ...and with one, the loader type updates to excel.
    let (status, body) = json_request(
        router(&harness),
        Method::PATCH,
        "/api/source-tables",
        Some(&format!(
            "run_id={run_id}&st_oid={st_oid}&table_name=ACCOUNTS&file_id=F101\
             &file_name=accounts.xlsx&sub_table=Sheet1&collect_type=download"
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");

    let (status, body) = json_request(
        router(&harness),
        Method::GET,
        &format!("/api/source-tables/{run_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["loader_type"], "excel");
    assert_eq!(body[0]["sub_table"], "Sheet1");

    let (status, body) = json_request(
        router(&harness),
        Method::DELETE,
        &format!("/api/source-tables?run_id={run_id}&st_oid={st_oid}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows_affected"], 1);

    // Pickup: first claim wins, the second conflicts.
    let runs_repo = RunRepository::new(harness.pool.clone());
    let pickup_run = insert_run(&harness.pool, "collection").await;
    runs_repo.pickup(pickup_run, &user).await.unwrap();
    let run = runs_repo.get(pickup_run).await.unwrap().unwrap();
    assert_eq!(run.collection_user_id, Some(user_id));
    let err = runs_repo.pickup(pickup_run, &user).await.unwrap_err();
    assert!(err.to_string().contains("already picked up"));
}
