//! Job envelope payloads.

use serde::{Deserialize, Serialize};

/// The one job type in this system: run a System task on a worker.
pub const SYSTEM_JOB_TYPE: &str = "system_task";

/// Payload of a scheduled System-task invocation.
///
/// `run_next` carries the "run all" intent: on success the worker chains
/// the next Waiting System task of the same run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemJob {
    pub pr_task_id: i64,
    pub run_id: i64,
    /// Catalog key resolving to the task implementation.
    pub task_id: i64,
    pub run_next: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_roundtrip() {
        let job = SystemJob {
            pr_task_id: 1,
            run_id: 7,
            task_id: 3,
            run_next: true,
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["pr_task_id"], 1);
        assert_eq!(value["run_next"], true);
        let back: SystemJob = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }
}
