//! Workflow operation and action catalog rows.

use diesel::prelude::*;
use serde::Serialize;

use crate::schema::{actions, workflow_operations};

/// One entry of the workflow operation catalog. `code` identifies a stage,
/// `role` gates visibility, `rank` orders the navigation list.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = workflow_operations, primary_key(code))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WorkflowOperation {
    pub code: String,
    pub href: String,
    pub role: String,
    pub rank: i32,
}

/// Statically declared (role, state, href, label) tuple shown to users
/// based on run state.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = actions, primary_key(action_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Action {
    pub action_id: i64,
    pub role: String,
    pub operation_state: String,
    pub href: String,
    pub label: String,
}
