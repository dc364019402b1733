//! Pipeline run queries and the stage-slot pickup operation.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::PgPool;
use crate::error::CoreError;
use crate::models::{PipelineRun, User, WorkflowStage};
use crate::schema::pipeline_runs;

#[derive(Clone)]
pub struct RunRepository {
    pool: PgPool,
}

impl RunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, run_id: i64) -> Result<Option<PipelineRun>, CoreError> {
        let mut conn = self.pool.get().await?;
        Ok(pipeline_runs::table
            .find(run_id)
            .first::<PipelineRun>(&mut conn)
            .await
            .optional()?)
    }

    /// Run lookup that fails with `NotFound` instead of returning an option.
    pub async fn require(&self, run_id: i64) -> Result<PipelineRun, CoreError> {
        self.get(run_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("run {run_id} not found")))
    }

    /// Runs in the given workflow stage owned by the caller (admins see all
    /// runs in the stage, including unclaimed ones).
    pub async fn runs_for_stage(
        &self,
        stage: WorkflowStage,
        user: &User,
    ) -> Result<Vec<PipelineRun>, CoreError> {
        let mut conn = self.pool.get().await?;
        let base = pipeline_runs::table
            .filter(pipeline_runs::workflow_operation.eq(stage.as_str()))
            .order(pipeline_runs::run_id.desc());

        let runs = if user.is_admin() {
            base.load::<PipelineRun>(&mut conn).await?
        } else {
            let uid = user.user_id;
            match stage {
                WorkflowStage::Collection => {
                    base.filter(pipeline_runs::collection_user_id.eq(uid))
                        .load::<PipelineRun>(&mut conn)
                        .await?
                }
                WorkflowStage::Load => {
                    base.filter(pipeline_runs::load_user_id.eq(uid))
                        .load::<PipelineRun>(&mut conn)
                        .await?
                }
                WorkflowStage::Check => {
                    base.filter(pipeline_runs::check_user_id.eq(uid))
                        .load::<PipelineRun>(&mut conn)
                        .await?
                }
                WorkflowStage::Qa => {
                    base.filter(pipeline_runs::qa_user_id.eq(uid))
                        .load::<PipelineRun>(&mut conn)
                        .await?
                }
            }
        };
        Ok(runs)
    }

    /// Claim the run's current stage slot for the user iff it is empty.
    ///
    /// The guarded UPDATE makes concurrent pickups race safely: exactly one
    /// caller sees a row change.
    pub async fn pickup(&self, run_id: i64, user: &User) -> Result<(), CoreError> {
        let run = self.require(run_id).await?;
        let stage = run.stage().ok_or_else(|| {
            CoreError::bad_request(format!(
                "run {run_id} has unknown workflow operation '{}'",
                run.workflow_operation
            ))
        })?;

        let mut conn = self.pool.get().await?;
        let target = pipeline_runs::table.find(run_id);
        let rows = match stage {
            WorkflowStage::Collection => {
                diesel::update(target.filter(pipeline_runs::collection_user_id.is_null()))
                    .set(pipeline_runs::collection_user_id.eq(user.user_id))
                    .execute(&mut conn)
                    .await?
            }
            WorkflowStage::Load => {
                diesel::update(target.filter(pipeline_runs::load_user_id.is_null()))
                    .set(pipeline_runs::load_user_id.eq(user.user_id))
                    .execute(&mut conn)
                    .await?
            }
            WorkflowStage::Check => {
                diesel::update(target.filter(pipeline_runs::check_user_id.is_null()))
                    .set(pipeline_runs::check_user_id.eq(user.user_id))
                    .execute(&mut conn)
                    .await?
            }
            WorkflowStage::Qa => {
                diesel::update(target.filter(pipeline_runs::qa_user_id.is_null()))
                    .set(pipeline_runs::qa_user_id.eq(user.user_id))
                    .execute(&mut conn)
                    .await?
            }
        };

        if rows == 0 {
            return Err(CoreError::conflict(format!(
                "run {run_id} is already picked up for {}",
                stage.as_str()
            )));
        }
        Ok(())
    }

    /// Confirm the user owns the run's current stage slot (admin bypass).
    pub async fn check_user_run(&self, run_id: i64, user: &User) -> Result<PipelineRun, CoreError> {
        let run = self.require(run_id).await?;
        if user.is_admin() {
            return Ok(run);
        }
        match run.stage_user_id() {
            Some(uid) if uid == user.user_id => Ok(run),
            _ => Err(CoreError::unauthorized(format!(
                "user {} does not own run {run_id} for its current stage",
                user.username
            ))),
        }
    }
}
