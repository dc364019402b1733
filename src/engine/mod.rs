//! Task execution engine.
//!
//! Validates preconditions, executes User tasks inline, schedules System
//! tasks onto the job queue, and owns reset semantics. The worker pool
//! drives the scheduled half; both sides funnel status writes through the
//! same repository transitions.

use std::sync::Arc;

use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;

use crate::config::Settings;
use crate::error::CoreError;
use crate::job_queue::{self, JobQueue, SystemJob};
use crate::models::{PipelineRunTask, TaskStatus, User};
use crate::registry::{self, TaskContext, TaskKind};
use crate::repository::tasks as task_queries;
use crate::repository::{PgPool, RunRepository, TaskRepository};

/// Outcome of a `run_task` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// System task persisted as Scheduled and enqueued.
    Scheduled(i64),
    /// User task executed inline and completed.
    Completed(i64),
    /// User task executed inline and failed.
    Failed(i64, String),
}

impl RunOutcome {
    /// The `{success: ...}` / `{error: ...}` body the API returns.
    pub fn into_body(self) -> serde_json::Value {
        match self {
            Self::Scheduled(id) => serde_json::json!({ "success": format!("Scheduled {id}") }),
            Self::Completed(id) => serde_json::json!({ "success": format!("Completed {id}") }),
            Self::Failed(_, message) => serde_json::json!({ "error": message }),
        }
    }
}

#[derive(Clone)]
pub struct TaskEngine {
    ctx: TaskContext,
    queue: JobQueue,
    runs: RunRepository,
    tasks: TaskRepository,
}

impl TaskEngine {
    pub fn new(pool: PgPool, settings: Arc<Settings>, queue: JobQueue) -> Self {
        Self {
            runs: RunRepository::new(pool.clone()),
            tasks: TaskRepository::new(pool.clone()),
            ctx: TaskContext { pool, settings },
            queue,
        }
    }

    /// Task list for a run in execution order. Read-only.
    pub async fn ordered_tasks(&self, run_id: i64) -> Result<Vec<PipelineRunTask>, CoreError> {
        self.tasks.ordered(run_id).await
    }

    /// Authorize the user against the run's stage slot (or admin), then
    /// return the task record.
    pub async fn record_for_run(
        &self,
        user: &User,
        run_id: i64,
        pr_task_id: i64,
    ) -> Result<PipelineRunTask, CoreError> {
        self.runs.check_user_run(run_id, user).await?;
        self.tasks.get_for_run(run_id, pr_task_id).await
    }

    /// Single-row status read.
    pub async fn task_status(&self, pr_task_id: i64) -> Result<TaskStatus, CoreError> {
        self.tasks
            .status(pr_task_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("task {pr_task_id} not found")))
    }

    /// Run one task: User tasks execute synchronously, System tasks are
    /// persisted as Scheduled and enqueued with the `run_next` intent.
    pub async fn run_task(
        &self,
        user: &User,
        run_id: i64,
        pr_task_id: i64,
        run_next: bool,
    ) -> Result<RunOutcome, CoreError> {
        let task = self.record_for_run(user, run_id, pr_task_id).await?;

        if active_count_for(&self.ctx.pool, run_id).await? > 0 {
            return Err(CoreError::conflict("Task already running"));
        }
        if task.task_status != TaskStatus::Waiting {
            return Err(CoreError::conflict(format!(
                "Task {pr_task_id} is {} and cannot be run",
                task.task_status.as_str()
            )));
        }

        let def = registry::find(task.task_id).ok_or_else(|| {
            CoreError::not_found(format!("task {} is not in the catalog", task.task_id))
        })?;

        match def.kind {
            TaskKind::User(run) => {
                let mut conn = self.ctx.pool.get().await?;
                task_queries::set_status_in(&mut conn, pr_task_id, TaskStatus::Scheduled, None)
                    .await?;
                task_queries::set_status_in(&mut conn, pr_task_id, TaskStatus::Running, None)
                    .await?;
                drop(conn);

                match run(&self.ctx, &task).await {
                    Ok(message) => {
                        self.tasks
                            .set_status(pr_task_id, TaskStatus::Complete, message.as_deref())
                            .await?;
                        Ok(RunOutcome::Completed(pr_task_id))
                    }
                    Err(e) => {
                        let message = e.to_string();
                        self.tasks
                            .set_status(pr_task_id, TaskStatus::Failed, Some(&message))
                            .await?;
                        Ok(RunOutcome::Failed(pr_task_id, message))
                    }
                }
            }
            TaskKind::System(_) => {
                let job = SystemJob {
                    pr_task_id,
                    run_id,
                    task_id: task.task_id,
                    run_next,
                };
                let mut conn = self.ctx.pool.get().await?;
                conn.transaction::<_, CoreError, _>(|conn| {
                    async move {
                        task_queries::set_status_in(
                            conn,
                            job.pr_task_id,
                            TaskStatus::Scheduled,
                            None,
                        )
                        .await?;
                        job_queue::queue::enqueue_in(conn, &job).await?;
                        Ok(())
                    }
                    .scope_boxed()
                })
                .await?;
                Ok(RunOutcome::Scheduled(pr_task_id))
            }
        }
    }

    /// Reset a task (and any children spawned under it) back to Waiting.
    pub async fn reset_task(
        &self,
        user: &User,
        run_id: i64,
        pr_task_id: i64,
    ) -> Result<(), CoreError> {
        let task = self.record_for_run(user, run_id, pr_task_id).await?;
        if task.task_status.is_active() {
            return Err(CoreError::conflict(format!(
                "Task {pr_task_id} is {} and cannot be reset",
                task.task_status.as_str()
            )));
        }

        let mut conn = self.ctx.pool.get().await?;
        conn.transaction::<_, CoreError, _>(|conn| {
            async move {
                task_queries::delete_children_in(conn, pr_task_id).await?;
                task_queries::set_status_in(conn, pr_task_id, TaskStatus::Waiting, None).await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;
        Ok(())
    }
}

async fn active_count_for(pool: &PgPool, run_id: i64) -> Result<i64, CoreError> {
    let mut conn = pool.get().await?;
    Ok(task_queries::active_count_in(&mut conn, run_id).await?)
}
