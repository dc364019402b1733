//! Database-backed FIFO of job envelopes.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use super::job::{SystemJob, SYSTEM_JOB_TYPE};
use crate::error::CoreError;
use crate::repository::PgPool;
use crate::schema::background_jobs;

/// A claimed job: envelope plus queue bookkeeping.
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: i64,
    pub envelope: SystemJob,
    pub attempt_count: i32,
}

#[derive(QueryableByName)]
struct JobRow {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    job_id: i64,
    #[diesel(sql_type = diesel::sql_types::Jsonb)]
    payload: serde_json::Value,
    #[diesel(sql_type = diesel::sql_types::Integer)]
    attempt_count: i32,
}

#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
    lease_seconds: f64,
}

impl JobQueue {
    pub fn new(pool: PgPool, lease_seconds: u64) -> Self {
        Self {
            pool,
            lease_seconds: lease_seconds as f64,
        }
    }

    /// Enqueue a job on its own connection.
    pub async fn enqueue(&self, job: &SystemJob) -> Result<i64, CoreError> {
        let mut conn = self.pool.get().await?;
        Ok(enqueue_in(&mut conn, job).await?)
    }

    /// Transactionally claim the next ready job by taking a lease.
    ///
    /// Ready means: scheduled in the past and either never leased or holding
    /// an expired lease. `SKIP LOCKED` keeps concurrent claimers from
    /// serializing on the same row.
    pub async fn claim_next(&self, worker: Uuid) -> Result<Option<Job>, CoreError> {
        let mut conn = self.pool.get().await?;
        let row: Option<JobRow> = diesel::sql_query(
            "UPDATE background_jobs \
             SET lease_holder = $1, \
                 lease_expires = now() + make_interval(secs => $2), \
                 attempt_count = attempt_count + 1 \
             WHERE job_id = ( \
                 SELECT job_id FROM background_jobs \
                 WHERE job_type = $3 \
                   AND scheduled_at <= now() \
                   AND (lease_holder IS NULL OR lease_expires < now()) \
                 ORDER BY scheduled_at, job_id \
                 FOR UPDATE SKIP LOCKED \
                 LIMIT 1 \
             ) \
             RETURNING job_id, payload, attempt_count",
        )
        .bind::<diesel::sql_types::Uuid, _>(worker)
        .bind::<diesel::sql_types::Double, _>(self.lease_seconds)
        .bind::<diesel::sql_types::Text, _>(SYSTEM_JOB_TYPE)
        .get_result(&mut conn)
        .await
        .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };
        let envelope: SystemJob = serde_json::from_value(row.payload)
            .map_err(|e| CoreError::Pool(format!("malformed job payload: {e}")))?;
        Ok(Some(Job {
            job_id: row.job_id,
            envelope,
            attempt_count: row.attempt_count,
        }))
    }

    /// Extend the lease on a job this worker still holds.
    pub async fn refresh_lease(&self, job_id: i64, worker: Uuid) -> Result<(), CoreError> {
        let mut conn = self.pool.get().await?;
        let expires = Utc::now() + chrono::Duration::seconds(self.lease_seconds as i64);
        diesel::update(
            background_jobs::table
                .find(job_id)
                .filter(background_jobs::lease_holder.eq(worker)),
        )
        .set(background_jobs::lease_expires.eq(Some(expires)))
        .execute(&mut conn)
        .await?;
        Ok(())
    }

    /// Put a claimed job back without handling it (lost lock race).
    pub async fn release(&self, job_id: i64) -> Result<(), CoreError> {
        let mut conn = self.pool.get().await?;
        diesel::update(background_jobs::table.find(job_id))
            .set((
                background_jobs::lease_holder.eq(None::<Uuid>),
                background_jobs::lease_expires.eq(None::<DateTime<Utc>>),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Remove a handled job (success and terminal failure both count).
    pub async fn delete(&self, job_id: i64) -> Result<(), CoreError> {
        let mut conn = self.pool.get().await?;
        diesel::delete(background_jobs::table.find(job_id))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

/// Insert a job row; takes a connection so schedulers can pair it with the
/// task's `Scheduled` transition in one transaction.
pub(crate) async fn enqueue_in(
    conn: &mut AsyncPgConnection,
    job: &SystemJob,
) -> Result<i64, diesel::result::Error> {
    let payload = serde_json::to_value(job).unwrap_or_else(|_| serde_json::json!({}));
    diesel::insert_into(background_jobs::table)
        .values((
            background_jobs::job_type.eq(SYSTEM_JOB_TYPE),
            background_jobs::payload.eq(payload),
            background_jobs::scheduled_at.eq(Utc::now()),
            background_jobs::attempt_count.eq(0),
        ))
        .returning(background_jobs::job_id)
        .get_result(conn)
        .await
}
