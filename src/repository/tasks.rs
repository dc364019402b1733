//! Pipeline run task queries and state-machine transitions.
//!
//! Reads go through the pooled methods; every mutation takes an explicit
//! connection so the engine and the worker can compose them inside their
//! own transactions.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use super::PgPool;
use crate::error::CoreError;
use crate::models::{PipelineRunTask, TaskCatalogEntry, TaskStatus};
use crate::schema::{pipeline_run_tasks, tasks};

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Task list for a run in execution order.
    pub async fn ordered(&self, run_id: i64) -> Result<Vec<PipelineRunTask>, CoreError> {
        let mut conn = self.pool.get().await?;
        Ok(pipeline_run_tasks::table
            .filter(pipeline_run_tasks::run_id.eq(run_id))
            .order((
                pipeline_run_tasks::task_order.asc(),
                pipeline_run_tasks::pr_task_id.asc(),
            ))
            .load::<PipelineRunTask>(&mut conn)
            .await?)
    }

    pub async fn get(&self, pr_task_id: i64) -> Result<Option<PipelineRunTask>, CoreError> {
        let mut conn = self.pool.get().await?;
        Ok(pipeline_run_tasks::table
            .find(pr_task_id)
            .first::<PipelineRunTask>(&mut conn)
            .await
            .optional()?)
    }

    /// Fetch a task scoped to its run, failing with `NotFound` otherwise.
    pub async fn get_for_run(
        &self,
        run_id: i64,
        pr_task_id: i64,
    ) -> Result<PipelineRunTask, CoreError> {
        let mut conn = self.pool.get().await?;
        pipeline_run_tasks::table
            .find(pr_task_id)
            .filter(pipeline_run_tasks::run_id.eq(run_id))
            .first::<PipelineRunTask>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| {
                CoreError::not_found(format!("task {pr_task_id} not found in run {run_id}"))
            })
    }

    pub async fn catalog(&self, task_id: i64) -> Result<Option<TaskCatalogEntry>, CoreError> {
        let mut conn = self.pool.get().await?;
        Ok(tasks::table
            .find(task_id)
            .first::<TaskCatalogEntry>(&mut conn)
            .await
            .optional()?)
    }

    /// Number of tasks currently holding the run's in-flight slot.
    pub async fn active_count(&self, run_id: i64) -> Result<i64, CoreError> {
        let mut conn = self.pool.get().await?;
        Ok(active_count_in(&mut conn, run_id).await?)
    }

    pub async fn status(&self, pr_task_id: i64) -> Result<Option<TaskStatus>, CoreError> {
        let mut conn = self.pool.get().await?;
        Ok(pipeline_run_tasks::table
            .find(pr_task_id)
            .select(pipeline_run_tasks::task_status)
            .first::<TaskStatus>(&mut conn)
            .await
            .optional()?)
    }

    /// Single-status write with arc validation; used by the engine and the
    /// worker, never by handlers directly.
    pub async fn set_status(
        &self,
        pr_task_id: i64,
        status: TaskStatus,
        message: Option<&str>,
    ) -> Result<(), CoreError> {
        let mut conn = self.pool.get().await?;
        set_status_in(&mut conn, pr_task_id, status, message).await
    }
}

pub(crate) async fn active_count_in(
    conn: &mut AsyncPgConnection,
    run_id: i64,
) -> Result<i64, diesel::result::Error> {
    pipeline_run_tasks::table
        .filter(pipeline_run_tasks::run_id.eq(run_id))
        .filter(
            pipeline_run_tasks::task_status
                .eq(TaskStatus::Scheduled)
                .or(pipeline_run_tasks::task_status.eq(TaskStatus::Running)),
        )
        .count()
        .get_result(conn)
        .await
}

/// Acquire the task row under `FOR SHARE NOWAIT`. A second worker racing on
/// the same row fails with "lock not available" instead of blocking.
pub(crate) async fn lock_for_share(
    conn: &mut AsyncPgConnection,
    pr_task_id: i64,
) -> Result<Option<PipelineRunTask>, diesel::result::Error> {
    pipeline_run_tasks::table
        .find(pr_task_id)
        .for_share()
        .no_wait()
        .first::<PipelineRunTask>(conn)
        .await
        .optional()
}

/// Next `Waiting` task for the run in execution order, with its catalog row.
pub(crate) async fn next_waiting_in(
    conn: &mut AsyncPgConnection,
    run_id: i64,
) -> Result<Option<(PipelineRunTask, TaskCatalogEntry)>, diesel::result::Error> {
    pipeline_run_tasks::table
        .inner_join(tasks::table)
        .filter(pipeline_run_tasks::run_id.eq(run_id))
        .filter(pipeline_run_tasks::task_status.eq(TaskStatus::Waiting))
        .order((
            pipeline_run_tasks::task_order.asc(),
            pipeline_run_tasks::pr_task_id.asc(),
        ))
        .select((
            PipelineRunTask::as_select(),
            TaskCatalogEntry::as_select(),
        ))
        .first::<(PipelineRunTask, TaskCatalogEntry)>(conn)
        .await
        .optional()
}

/// Apply a validated status transition with its field invariants:
/// `task_start` set iff entering Running, `task_completed` set iff entering
/// a terminal state, everything cleared on reset to Waiting.
pub(crate) async fn set_status_in(
    conn: &mut AsyncPgConnection,
    pr_task_id: i64,
    next: TaskStatus,
    message: Option<&str>,
) -> Result<(), CoreError> {
    let current: TaskStatus = pipeline_run_tasks::table
        .find(pr_task_id)
        .select(pipeline_run_tasks::task_status)
        .first::<TaskStatus>(conn)
        .await
        .optional()?
        .ok_or_else(|| CoreError::not_found(format!("task {pr_task_id} not found")))?;

    if !current.can_transition_to(next) {
        return Err(CoreError::conflict(format!(
            "illegal task transition {} -> {}",
            current.as_str(),
            next.as_str()
        )));
    }

    let now = Utc::now();
    let target = pipeline_run_tasks::table.find(pr_task_id);
    match next {
        TaskStatus::Scheduled => {
            diesel::update(target)
                .set(pipeline_run_tasks::task_status.eq(TaskStatus::Scheduled))
                .execute(conn)
                .await?;
        }
        TaskStatus::Running => {
            diesel::update(target)
                .set((
                    pipeline_run_tasks::task_status.eq(TaskStatus::Running),
                    pipeline_run_tasks::task_running.eq(true),
                    pipeline_run_tasks::task_start.eq(Some(now)),
                ))
                .execute(conn)
                .await?;
        }
        TaskStatus::Complete => {
            diesel::update(target)
                .set((
                    pipeline_run_tasks::task_status.eq(TaskStatus::Complete),
                    pipeline_run_tasks::task_running.eq(false),
                    pipeline_run_tasks::task_complete.eq(true),
                    pipeline_run_tasks::task_completed.eq(Some(now)),
                    pipeline_run_tasks::task_message.eq(message),
                ))
                .execute(conn)
                .await?;
        }
        TaskStatus::Failed => {
            diesel::update(target)
                .set((
                    pipeline_run_tasks::task_status.eq(TaskStatus::Failed),
                    pipeline_run_tasks::task_running.eq(false),
                    pipeline_run_tasks::task_complete.eq(false),
                    pipeline_run_tasks::task_completed.eq(Some(now)),
                    pipeline_run_tasks::task_message.eq(message),
                ))
                .execute(conn)
                .await?;
        }
        TaskStatus::Waiting => {
            diesel::update(target)
                .set((
                    pipeline_run_tasks::task_status.eq(TaskStatus::Waiting),
                    pipeline_run_tasks::task_running.eq(false),
                    pipeline_run_tasks::task_complete.eq(false),
                    pipeline_run_tasks::task_start.eq(None::<chrono::DateTime<Utc>>),
                    pipeline_run_tasks::task_completed.eq(None::<chrono::DateTime<Utc>>),
                    pipeline_run_tasks::task_message.eq(None::<&str>),
                ))
                .execute(conn)
                .await?;
        }
    }
    Ok(())
}

/// Delete every task spawned under `pr_task_id`, transitively.
pub(crate) async fn delete_children_in(
    conn: &mut AsyncPgConnection,
    pr_task_id: i64,
) -> Result<usize, diesel::result::Error> {
    diesel::sql_query(
        "WITH RECURSIVE kids AS ( \
             SELECT pr_task_id FROM pipeline_run_tasks WHERE parent_pr_task_id = $1 \
             UNION ALL \
             SELECT t.pr_task_id FROM pipeline_run_tasks t \
             JOIN kids k ON t.parent_pr_task_id = k.pr_task_id \
         ) \
         DELETE FROM pipeline_run_tasks \
         WHERE pr_task_id IN (SELECT pr_task_id FROM kids)",
    )
    .bind::<diesel::sql_types::BigInt, _>(pr_task_id)
    .execute(conn)
    .await
}

/// Insert a dynamically spawned child task directly after its parent.
///
/// The child shares the parent's order index; the identity tiebreak in the
/// ordered read places it between the parent and the next declared task.
pub(crate) async fn insert_child_in(
    conn: &mut AsyncPgConnection,
    parent: &PipelineRunTask,
    task_id: i64,
) -> Result<i64, diesel::result::Error> {
    diesel::insert_into(pipeline_run_tasks::table)
        .values((
            pipeline_run_tasks::run_id.eq(parent.run_id),
            pipeline_run_tasks::task_id.eq(task_id),
            pipeline_run_tasks::task_order.eq(parent.task_order),
            pipeline_run_tasks::task_status.eq(TaskStatus::Waiting),
            pipeline_run_tasks::task_running.eq(false),
            pipeline_run_tasks::task_complete.eq(false),
            pipeline_run_tasks::parent_pr_task_id.eq(Some(parent.pr_task_id)),
        ))
        .returning(pipeline_run_tasks::pr_task_id)
        .get_result(conn)
        .await
}
