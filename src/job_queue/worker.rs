//! Worker pool: claims jobs, drives System tasks through the state machine,
//! chains run-all successors, and reaps abandoned tasks at startup.

use std::time::Duration;

use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::job::SystemJob;
use super::queue::{Job, JobQueue};
use crate::error::CoreError;
use crate::models::{TaskRunType, TaskStatus};
use crate::registry::{self, TaskContext};
use crate::repository::tasks as task_queries;
use crate::repository::{is_lock_unavailable, PgPool};

/// Idle poll interval when the queue is empty.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Backoff after a queue error.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub struct WorkerPool {
    pool: PgPool,
    queue: JobQueue,
    ctx: TaskContext,
    worker_count: usize,
    lease_seconds: u64,
}

impl WorkerPool {
    pub fn new(ctx: TaskContext, queue: JobQueue, worker_count: usize, lease_seconds: u64) -> Self {
        Self {
            pool: ctx.pool.clone(),
            queue,
            ctx,
            worker_count,
            lease_seconds,
        }
    }

    /// Reap abandoned tasks, then run workers until shutdown.
    pub async fn run(self) -> Result<(), CoreError> {
        let reaped = reap_abandoned(&self.pool).await?;
        if reaped > 0 {
            tracing::warn!(count = reaped, "reaped abandoned tasks to failed");
        }

        let mut workers = tokio::task::JoinSet::new();
        for n in 0..self.worker_count {
            let queue = self.queue.clone();
            let ctx = self.ctx.clone();
            let lease = self.lease_seconds;
            workers.spawn(async move {
                worker_loop(n, queue, ctx, lease).await;
            });
        }
        tracing::info!(workers = self.worker_count, "worker pool started");

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| CoreError::Pool(e.to_string()))?;
        tracing::info!("shutting down worker pool");
        workers.shutdown().await;
        Ok(())
    }
}

async fn worker_loop(n: usize, queue: JobQueue, ctx: TaskContext, lease_seconds: u64) {
    let worker_id = Uuid::new_v4();
    tracing::info!(worker = n, %worker_id, "worker online");

    loop {
        match queue.claim_next(worker_id).await {
            Ok(Some(job)) => {
                // Keep the lease alive while the task runs; a wedged task
                // stops refreshing once the worker dies and gets reaped.
                let refresher = spawn_lease_refresher(
                    queue.clone(),
                    job.job_id,
                    worker_id,
                    lease_seconds,
                );
                if let Err(e) = handle_job(&queue, &ctx, &job).await {
                    tracing::error!(job_id = job.job_id, error = %e, "job handling failed");
                }
                refresher.abort();
            }
            Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
            Err(e) => {
                tracing::warn!(worker = n, error = %e, "claim failed");
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
    }
}

fn spawn_lease_refresher(
    queue: JobQueue,
    job_id: i64,
    worker_id: Uuid,
    lease_seconds: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs((lease_seconds / 3).max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // immediate first tick
        loop {
            ticker.tick().await;
            if let Err(e) = queue.refresh_lease(job_id, worker_id).await {
                tracing::warn!(job_id, error = %e, "lease refresh failed");
            }
        }
    })
}

/// Drive one claimed job through the task state machine.
async fn handle_job(queue: &JobQueue, ctx: &TaskContext, job: &Job) -> Result<(), CoreError> {
    let envelope = &job.envelope;
    tracing::debug!(
        job_id = job.job_id,
        pr_task_id = envelope.pr_task_id,
        attempt = job.attempt_count,
        "claimed job"
    );

    // Scheduled -> Running, guarded by the FOR SHARE row lock. Losing the
    // lock race abandons the job back to the queue; a stale job whose task
    // moved on is simply dropped.
    match begin_running(ctx, envelope).await? {
        Begin::Started => {}
        Begin::LockBusy => {
            tracing::warn!(
                pr_task_id = envelope.pr_task_id,
                "task row locked by another worker, releasing job"
            );
            return queue.release(job.job_id).await;
        }
        Begin::Stale => {
            tracing::warn!(
                pr_task_id = envelope.pr_task_id,
                "task no longer scheduled, dropping job"
            );
            return queue.delete(job.job_id).await;
        }
    }

    let tasks = crate::repository::TaskRepository::new(ctx.pool.clone());
    let task = match tasks.get(envelope.pr_task_id).await? {
        Some(task) => task,
        None => return queue.delete(job.job_id).await,
    };

    let outcome = match registry::find(envelope.task_id) {
        Some(def) if def.run_type() == TaskRunType::System => {
            let run = def.run_fn();
            run(ctx, &task).await
        }
        Some(_) => Err(anyhow::anyhow!(
            "task {} is not a system task",
            envelope.task_id
        )),
        None => Err(anyhow::anyhow!("unknown task id {}", envelope.task_id)),
    };

    let mut conn = ctx.pool.get().await?;
    match outcome {
        Ok(message) => {
            task_queries::set_status_in(
                &mut conn,
                envelope.pr_task_id,
                TaskStatus::Complete,
                message.as_deref(),
            )
            .await?;
            tracing::info!(
                pr_task_id = envelope.pr_task_id,
                run_id = envelope.run_id,
                "task complete"
            );

            if envelope.run_next {
                schedule_next(&mut conn, envelope).await?;
            }
        }
        Err(e) => {
            let message = e.to_string();
            task_queries::set_status_in(
                &mut conn,
                envelope.pr_task_id,
                TaskStatus::Failed,
                Some(&message),
            )
            .await?;
            tracing::warn!(
                pr_task_id = envelope.pr_task_id,
                run_id = envelope.run_id,
                error = %message,
                "task failed"
            );
        }
    }

    queue.delete(job.job_id).await
}

enum Begin {
    Started,
    LockBusy,
    Stale,
}

async fn begin_running(ctx: &TaskContext, envelope: &SystemJob) -> Result<Begin, CoreError> {
    use diesel_async::scoped_futures::ScopedFutureExt;
    use diesel_async::AsyncConnection;

    let mut conn = ctx.pool.get().await?;
    let result = conn
        .transaction::<Begin, CoreError, _>(|conn| {
            async move {
                // A lock failure aborts the transaction, so it propagates as
                // an error and is mapped to LockBusy below.
                let locked = task_queries::lock_for_share(conn, envelope.pr_task_id).await?;
                match locked {
                    Some(task) if task.task_status == TaskStatus::Scheduled => {
                        task_queries::set_status_in(
                            conn,
                            envelope.pr_task_id,
                            TaskStatus::Running,
                            None,
                        )
                        .await?;
                        Ok(Begin::Started)
                    }
                    _ => Ok(Begin::Stale),
                }
            }
            .scope_boxed()
        })
        .await;

    match result {
        Ok(begin) => Ok(begin),
        Err(CoreError::Storage(e)) if is_lock_unavailable(&e) => Ok(Begin::LockBusy),
        Err(e) => Err(e),
    }
}

/// Run-all chaining: locate the next Waiting task; schedule it with the
/// chain intact when it is a System task, hand control back to the user
/// when it is not.
async fn schedule_next(
    conn: &mut diesel_async::AsyncPgConnection,
    envelope: &SystemJob,
) -> Result<(), CoreError> {
    use diesel_async::scoped_futures::ScopedFutureExt;
    use diesel_async::AsyncConnection;

    let Some((next_task, catalog)) = task_queries::next_waiting_in(conn, envelope.run_id).await?
    else {
        tracing::info!(run_id = envelope.run_id, "run chain finished");
        return Ok(());
    };

    if catalog.run_type != TaskRunType::System {
        tracing::info!(
            run_id = envelope.run_id,
            pr_task_id = next_task.pr_task_id,
            "chain reached a user task, stopping"
        );
        return Ok(());
    }

    let successor = SystemJob {
        pr_task_id: next_task.pr_task_id,
        run_id: envelope.run_id,
        task_id: next_task.task_id,
        run_next: true,
    };
    conn.transaction::<_, CoreError, _>(|conn| {
        async move {
            task_queries::set_status_in(conn, successor.pr_task_id, TaskStatus::Scheduled, None)
                .await?;
            super::queue::enqueue_in(conn, &successor).await?;
            Ok(())
        }
        .scope_boxed()
    })
    .await?;
    Ok(())
}

/// Sweep tasks left `task_running` by a dead worker: no live lease means
/// nobody is coming back for them.
pub(crate) async fn reap_abandoned(pool: &PgPool) -> Result<usize, CoreError> {
    let mut conn = pool.get().await?;
    let rows = diesel::sql_query(
        "UPDATE pipeline_run_tasks t \
         SET task_status = 'failed', \
             task_running = false, \
             task_complete = false, \
             task_completed = now(), \
             task_message = 'abandoned' \
         WHERE t.task_running = true \
           AND NOT EXISTS ( \
               SELECT 1 FROM background_jobs j \
               WHERE (j.payload->>'pr_task_id')::bigint = t.pr_task_id \
                 AND j.lease_expires > now() \
           )",
    )
    .execute(&mut conn)
    .await?;
    Ok(rows)
}
