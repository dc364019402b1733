//! JSON API handlers for operations, runs, and task commands.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::CoreError;
use crate::models::WorkflowStage;
use crate::server::{AppState, Principal};

/// Workflow operations visible to the caller's roles.
pub async fn list_operations(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<serde_json::Value>, CoreError> {
    let user = state.require_user(&principal).await?;
    let operations = state.users.operations_for(&user).await?;
    Ok(Json(serde_json::json!(operations)))
}

/// Actions visible to the caller's roles.
pub async fn list_actions(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<serde_json::Value>, CoreError> {
    let user = state.require_user(&principal).await?;
    let actions = state.users.actions_for(&user).await?;
    Ok(Json(serde_json::json!(actions)))
}

/// Runs in the given workflow stage owned by the caller.
pub async fn runs_for_stage(
    State(state): State<AppState>,
    principal: Principal,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let user = state.require_user(&principal).await?;
    let stage = WorkflowStage::from_str(&code)
        .ok_or_else(|| CoreError::bad_request(format!("unknown workflow stage '{code}'")))?;
    let runs = state.runs.runs_for_stage(stage, &user).await?;
    Ok(Json(serde_json::json!(runs)))
}

/// Ordered task list for a run.
pub async fn ordered_tasks(
    State(state): State<AppState>,
    _principal: Principal,
    Path(run_id): Path<i64>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let tasks = state.engine.ordered_tasks(run_id).await?;
    Ok(Json(serde_json::json!(tasks)))
}

/// Claim the run's current stage slot.
pub async fn pickup_run(
    State(state): State<AppState>,
    principal: Principal,
    Path(run_id): Path<i64>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let user = state.require_user(&principal).await?;
    state.runs.pickup(run_id, &user).await?;
    Ok(Json(
        serde_json::json!({ "success": format!("Picked up {run_id}") }),
    ))
}

/// Run a single task.
pub async fn run_task(
    State(state): State<AppState>,
    principal: Principal,
    Path((run_id, pr_task_id)): Path<(i64, i64)>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let user = state.require_user(&principal).await?;
    let outcome = state
        .engine
        .run_task(&user, run_id, pr_task_id, false)
        .await?;
    Ok(Json(outcome.into_body()))
}

/// Run tasks until a user task or failure stops the chain.
pub async fn run_all(
    State(state): State<AppState>,
    principal: Principal,
    Path((run_id, pr_task_id)): Path<(i64, i64)>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let user = state.require_user(&principal).await?;
    let outcome = state
        .engine
        .run_task(&user, run_id, pr_task_id, true)
        .await?;
    Ok(Json(outcome.into_body()))
}

/// Reset a task (and its spawned children) to Waiting.
pub async fn reset_task(
    State(state): State<AppState>,
    principal: Principal,
    Path((run_id, pr_task_id)): Path<(i64, i64)>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let user = state.require_user(&principal).await?;
    state.engine.reset_task(&user, run_id, pr_task_id).await?;
    Ok(Json(
        serde_json::json!({ "success": format!("Reset {pr_task_id}") }),
    ))
}

#[derive(Deserialize)]
pub struct TaskStatusQuery {
    #[serde(rename = "prTaskId")]
    pr_task_id: i64,
}

/// Single-row task status read.
pub async fn task_status(
    State(state): State<AppState>,
    _principal: Principal,
    Query(query): Query<TaskStatusQuery>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let status = state.engine.task_status(query.pr_task_id).await?;
    Ok(Json(serde_json::json!({ "status": status.as_str() })))
}
