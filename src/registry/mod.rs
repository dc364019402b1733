//! Compile-time task catalog.
//!
//! Every `task_id` maps to either a User task (executed synchronously in a
//! request handler) or a System task (executed by the worker pool). Both
//! kinds share the same run signature: a context handle plus the task row,
//! resolving to an optional completion message.

mod system_tasks;
mod user_tasks;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::Settings;
use crate::models::{PipelineRunTask, TaskRunType};
use crate::repository::PgPool;

/// Handles a task implementation needs: the shared pool plus settings
/// (data directory, database URL for the COPY path).
#[derive(Clone)]
pub struct TaskContext {
    pub pool: PgPool,
    pub settings: Arc<Settings>,
}

pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<Option<String>>> + Send + 'a>>;

/// A task entry point: borrows the context and the task row for the
/// duration of the run.
pub type TaskRun = for<'a> fn(&'a TaskContext, &'a PipelineRunTask) -> TaskFuture<'a>;

/// User tasks run inline in the request; System tasks run on a worker.
#[derive(Clone, Copy)]
pub enum TaskKind {
    User(TaskRun),
    System(TaskRun),
}

/// One catalog entry. The `tasks` table mirrors these rows at bootstrap so
/// run templates can reference them by id.
pub struct TaskDefinition {
    pub task_id: i64,
    pub name: &'static str,
    pub description: &'static str,
    pub kind: TaskKind,
}

impl TaskDefinition {
    pub fn run_type(&self) -> TaskRunType {
        match self.kind {
            TaskKind::User(_) => TaskRunType::User,
            TaskKind::System(_) => TaskRunType::System,
        }
    }

    pub fn run_fn(&self) -> TaskRun {
        match self.kind {
            TaskKind::User(f) | TaskKind::System(f) => f,
        }
    }
}

pub const SCAN_SOURCE_FOLDER: i64 = 1;
pub const COLLECT_SOURCE_FILES: i64 = 2;
pub const ANALYZE_FILES: i64 = 3;
pub const LOAD_FILES: i64 = 4;
pub const VALIDATE_RECORD_COUNTS: i64 = 5;
pub const CONFIRM_RUN: i64 = 6;

/// The default task template inserted for a new run, in execution order.
/// Record-count validation is not listed: the load task spawns it as a
/// child when it has loaded something.
pub const RUN_TEMPLATE: &[i64] = &[
    SCAN_SOURCE_FOLDER,
    COLLECT_SOURCE_FILES,
    ANALYZE_FILES,
    LOAD_FILES,
    CONFIRM_RUN,
];

static CATALOG: &[TaskDefinition] = &[
    TaskDefinition {
        task_id: SCAN_SOURCE_FOLDER,
        name: "Scan source folder",
        description: "Verify the run folder exists and every declared source file is present",
        kind: TaskKind::System(system_tasks::scan_source_folder),
    },
    TaskDefinition {
        task_id: COLLECT_SOURCE_FILES,
        name: "Collect source files",
        description: "Confirm collection of all declared source files",
        kind: TaskKind::User(user_tasks::collect_source_files),
    },
    TaskDefinition {
        task_id: ANALYZE_FILES,
        name: "Analyze files",
        description: "Compute column statistics and record counts for flagged tables",
        kind: TaskKind::System(system_tasks::analyze_files),
    },
    TaskDefinition {
        task_id: LOAD_FILES,
        name: "Load files",
        description: "Create staging tables and bulk-load flagged tables",
        kind: TaskKind::System(system_tasks::load_files),
    },
    TaskDefinition {
        task_id: VALIDATE_RECORD_COUNTS,
        name: "Validate record counts",
        description: "Compare loaded table counts against analyzed record counts",
        kind: TaskKind::System(system_tasks::validate_record_counts),
    },
    TaskDefinition {
        task_id: CONFIRM_RUN,
        name: "Confirm run",
        description: "Confirm every pipeline task completed before sign-off",
        kind: TaskKind::User(user_tasks::confirm_run),
    },
];

pub fn catalog() -> &'static [TaskDefinition] {
    CATALOG
}

pub fn find(task_id: i64) -> Option<&'static TaskDefinition> {
    CATALOG.iter().find(|d| d.task_id == task_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_ids_unique() {
        let mut ids: Vec<i64> = CATALOG.iter().map(|d| d.task_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[test]
    fn test_template_references_catalog() {
        for task_id in RUN_TEMPLATE {
            assert!(find(*task_id).is_some(), "template task {task_id} missing");
        }
    }

    #[test]
    fn test_find_unknown() {
        assert!(find(999).is_none());
    }

    #[test]
    fn test_run_types() {
        assert_eq!(
            find(COLLECT_SOURCE_FILES).unwrap().run_type(),
            crate::models::TaskRunType::User
        );
        assert_eq!(
            find(LOAD_FILES).unwrap().run_type(),
            crate::models::TaskRunType::System
        );
    }
}
