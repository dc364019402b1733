//! Pipeline run task model and its status state machine.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::pg_enum;
use crate::schema::{pipeline_run_tasks, sql_types, tasks};

/// Task execution status.
///
/// Transitions are restricted to
/// `Waiting -> Scheduled -> Running -> {Complete, Failed}` plus
/// `{Complete, Failed} -> Waiting` via reset. Everything else is rejected.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = sql_types::TaskStatus)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Waiting,
    Scheduled,
    Running,
    Complete,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "scheduled" => Some(Self::Scheduled),
            "running" => Some(Self::Running),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether the task occupies the run's single in-flight slot.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Running)
    }

    /// Whether the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether a transition from `self` to `next` is one of the legal arcs.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Scheduled)
                | (Self::Scheduled, Self::Running)
                | (Self::Running, Self::Complete)
                | (Self::Running, Self::Failed)
                | (Self::Complete, Self::Waiting)
                | (Self::Failed, Self::Waiting)
        )
    }
}

pg_enum!(TaskStatus, sql_types::TaskStatus);

/// Whether a catalog task runs interactively or on the worker pool.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = sql_types::TaskRunType)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunType {
    User,
    System,
}

impl TaskRunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

pg_enum!(TaskRunType, sql_types::TaskRunType);

/// Catalog row mirroring a compiled task registry entry.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = tasks, primary_key(task_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskCatalogEntry {
    pub task_id: i64,
    pub name: String,
    pub description: String,
    pub run_type: TaskRunType,
}

/// One step of a pipeline run.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = pipeline_run_tasks, primary_key(pr_task_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PipelineRunTask {
    pub pr_task_id: i64,
    pub run_id: i64,
    pub task_id: i64,
    pub task_order: i32,
    pub task_status: TaskStatus,
    pub task_running: bool,
    pub task_complete: bool,
    pub task_start: Option<DateTime<Utc>>,
    pub task_completed: Option<DateTime<Utc>>,
    pub task_message: Option<String>,
    pub parent_pr_task_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            TaskStatus::Waiting,
            TaskStatus::Scheduled,
            TaskStatus::Running,
            TaskStatus::Complete,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::from_str("pending"), None);
    }

    #[test]
    fn test_legal_arcs() {
        use TaskStatus::*;
        assert!(Waiting.can_transition_to(Scheduled));
        assert!(Scheduled.can_transition_to(Running));
        assert!(Running.can_transition_to(Complete));
        assert!(Running.can_transition_to(Failed));
        assert!(Complete.can_transition_to(Waiting));
        assert!(Failed.can_transition_to(Waiting));
    }

    #[test]
    fn test_illegal_arcs_rejected() {
        use TaskStatus::*;
        let all = [Waiting, Scheduled, Running, Complete, Failed];
        let legal = [
            (Waiting, Scheduled),
            (Scheduled, Running),
            (Running, Complete),
            (Running, Failed),
            (Complete, Waiting),
            (Failed, Waiting),
        ];
        for from in all {
            for to in all {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn test_active_states() {
        assert!(TaskStatus::Scheduled.is_active());
        assert!(TaskStatus::Running.is_active());
        assert!(!TaskStatus::Waiting.is_active());
        assert!(!TaskStatus::Complete.is_active());
        assert!(!TaskStatus::Failed.is_active());
    }
}
