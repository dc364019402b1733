//! Router configuration for the web server.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Catalog surfaces
        .route("/api/operations", get(handlers::list_operations))
        .route("/api/actions", get(handlers::list_actions))
        // Runs and tasks
        .route("/api/pipeline-runs/:code", get(handlers::runs_for_stage))
        .route(
            "/api/pipeline-run-tasks/:run_id",
            get(handlers::ordered_tasks),
        )
        .route("/api/pickup/:run_id", post(handlers::pickup_run))
        .route(
            "/api/run-task/:run_id/:pr_task_id",
            post(handlers::run_task),
        )
        .route("/api/run-all/:run_id/:pr_task_id", post(handlers::run_all))
        .route(
            "/api/reset-task/:run_id/:pr_task_id",
            post(handlers::reset_task),
        )
        .route("/api/task-status", get(handlers::task_status))
        // Source tables
        .route(
            "/api/source-tables/:run_id",
            get(handlers::list_source_tables),
        )
        .route(
            "/api/source-tables",
            post(handlers::create_source_table)
                .patch(handlers::update_source_table)
                .delete(handlers::delete_source_table),
        )
        // Task-change notification sockets
        .route(
            "/sockets/pipeline-run-tasks/:run_id",
            get(handlers::pipeline_run_tasks_socket),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
