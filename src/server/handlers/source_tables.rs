//! Source-table CRUD over a loose string form map.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::{Form, Json};

use crate::error::CoreError;
use crate::models::SourceTableForm;
use crate::server::{AppState, Principal};

/// List source tables for a run.
pub async fn list_source_tables(
    State(state): State<AppState>,
    _principal: Principal,
    Path(run_id): Path<i64>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let tables = state.source_tables.list(run_id).await?;
    Ok(Json(serde_json::json!(tables)))
}

fn parse_id(params: &HashMap<String, String>, key: &str) -> Result<i64, CoreError> {
    params
        .get(key)
        .ok_or_else(|| CoreError::bad_request(format!("{key} is required")))?
        .parse()
        .map_err(|_| CoreError::bad_request(format!("{key} must be numeric")))
}

/// Create a source table from form values.
pub async fn create_source_table(
    State(state): State<AppState>,
    principal: Principal,
    Form(params): Form<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let user = state.require_user(&principal).await?;
    let run_id = parse_id(&params, "run_id")?;
    state.runs.check_user_run(run_id, &user).await?;

    let form = SourceTableForm::from_map(&params)?;
    let (st_oid, rows) = state.source_tables.insert(run_id, &form).await?;
    Ok(Json(
        serde_json::json!({ "st_oid": st_oid, "rows_affected": rows }),
    ))
}

/// Update a source table from form values.
pub async fn update_source_table(
    State(state): State<AppState>,
    principal: Principal,
    Form(params): Form<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let user = state.require_user(&principal).await?;
    let run_id = parse_id(&params, "run_id")?;
    let st_oid = parse_id(&params, "st_oid")?;
    state.runs.check_user_run(run_id, &user).await?;

    let form = SourceTableForm::from_map(&params)?;
    let (st_oid, rows) = state.source_tables.update(st_oid, run_id, &form).await?;
    Ok(Json(
        serde_json::json!({ "st_oid": st_oid, "rows_affected": rows }),
    ))
}

/// Delete a source table. Identifiers arrive in the query string.
pub async fn delete_source_table(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let user = state.require_user(&principal).await?;
    let run_id = parse_id(&params, "run_id")?;
    let st_oid = parse_id(&params, "st_oid")?;
    state.runs.check_user_run(run_id, &user).await?;

    let (st_oid, rows) = state.source_tables.delete(st_oid, run_id).await?;
    Ok(Json(
        serde_json::json!({ "st_oid": st_oid, "rows_affected": rows }),
    ))
}
