//! User task implementations, executed synchronously inside a request.

use anyhow::bail;

use super::{TaskContext, TaskFuture};
use crate::models::{PipelineRunTask, TaskStatus};
use crate::repository::{SourceTableRepository, TaskRepository};

/// Confirm collection: every declared source file must be present in the
/// run folder.
pub(super) fn collect_source_files<'a>(
    ctx: &'a TaskContext,
    task: &'a PipelineRunTask,
) -> TaskFuture<'a> {
    Box::pin(async move {
        let repo = SourceTableRepository::new(ctx.pool.clone());
        let tables = repo.list(task.run_id).await?;
        if tables.is_empty() {
            bail!("no source tables declared for run {}", task.run_id);
        }

        let run_dir = ctx.settings.run_dir(task.run_id);
        let missing: Vec<&str> = tables
            .iter()
            .filter(|t| !run_dir.join(&t.file_name).is_file())
            .map(|t| t.file_name.as_str())
            .collect();
        if !missing.is_empty() {
            bail!("cannot confirm collection, missing: {}", missing.join(", "));
        }

        Ok(Some(format!(
            "collection confirmed, {} files present",
            tables.len()
        )))
    })
}

/// Final sign-off: every other task in the run must be complete.
pub(super) fn confirm_run<'a>(
    ctx: &'a TaskContext,
    task: &'a PipelineRunTask,
) -> TaskFuture<'a> {
    Box::pin(async move {
        let repo = TaskRepository::new(ctx.pool.clone());
        let tasks = repo.ordered(task.run_id).await?;

        let incomplete: Vec<String> = tasks
            .iter()
            .filter(|t| t.pr_task_id != task.pr_task_id)
            .filter(|t| t.task_status != TaskStatus::Complete)
            .map(|t| format!("task {}", t.pr_task_id))
            .collect();
        if !incomplete.is_empty() {
            bail!("run not ready for sign-off: {}", incomplete.join(", "));
        }

        Ok(Some("run confirmed".to_string()))
    })
}
