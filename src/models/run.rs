//! Pipeline run model and workflow stage enums.

use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::pg_enum;
use crate::schema::{pipeline_runs, sql_types};

/// Overall state of a run's current workflow operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = sql_types::OperationState)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Ready,
    Active,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Active => "active",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ready" => Some(Self::Ready),
            "active" => Some(Self::Active),
            _ => None,
        }
    }
}

pg_enum!(OperationState, sql_types::OperationState);

/// The four workflow stages a run progresses through.
///
/// Stage codes double as `workflow_operations.code` values; each stage has
/// one user slot on the run row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Collection,
    Load,
    Check,
    Qa,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Load => "load",
            Self::Check => "check",
            Self::Qa => "qa",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "collection" => Some(Self::Collection),
            "load" => Some(Self::Load),
            "check" => Some(Self::Check),
            "qa" => Some(Self::Qa),
            _ => None,
        }
    }
}

/// A pipeline run: one pass of a data source through the workflow stages.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = pipeline_runs, primary_key(run_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PipelineRun {
    pub run_id: i64,
    pub data_source_id: i64,
    pub record_date: NaiveDate,
    pub workflow_operation: String,
    pub operation_state: OperationState,
    pub collection_user_id: Option<i64>,
    pub load_user_id: Option<i64>,
    pub check_user_id: Option<i64>,
    pub qa_user_id: Option<i64>,
}

impl PipelineRun {
    /// Current workflow stage, if the stored code is one of the known four.
    pub fn stage(&self) -> Option<WorkflowStage> {
        WorkflowStage::from_str(&self.workflow_operation)
    }

    /// The user slot for the run's current stage.
    pub fn stage_user_id(&self) -> Option<i64> {
        match self.stage()? {
            WorkflowStage::Collection => self.collection_user_id,
            WorkflowStage::Load => self.load_user_id,
            WorkflowStage::Check => self.check_user_id,
            WorkflowStage::Qa => self.qa_user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with(stage: &str, collection: Option<i64>, load: Option<i64>) -> PipelineRun {
        PipelineRun {
            run_id: 1,
            data_source_id: 7,
            record_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            workflow_operation: stage.to_string(),
            operation_state: OperationState::Ready,
            collection_user_id: collection,
            load_user_id: load,
            check_user_id: None,
            qa_user_id: None,
        }
    }

    #[test]
    fn test_stage_roundtrip() {
        for stage in [
            WorkflowStage::Collection,
            WorkflowStage::Load,
            WorkflowStage::Check,
            WorkflowStage::Qa,
        ] {
            assert_eq!(WorkflowStage::from_str(stage.as_str()), Some(stage));
        }
        assert_eq!(WorkflowStage::from_str("review"), None);
    }

    #[test]
    fn test_stage_user_slot() {
        let run = run_with("collection", Some(4), Some(9));
        assert_eq!(run.stage_user_id(), Some(4));

        let run = run_with("load", Some(4), None);
        assert_eq!(run.stage_user_id(), None);

        let run = run_with("unknown", Some(4), None);
        assert_eq!(run.stage_user_id(), None);
    }
}
