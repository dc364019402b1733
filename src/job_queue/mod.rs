//! Durable job queue and worker pool.
//!
//! Jobs are rows in `background_jobs`; claiming takes a lease under
//! `FOR UPDATE SKIP LOCKED`, workers refresh their lease while running, and
//! expired leases make a job reclaimable by any worker.

mod job;
pub(crate) mod queue;
mod worker;

pub use job::{SystemJob, SYSTEM_JOB_TYPE};
pub use queue::{Job, JobQueue};
pub use worker::WorkerPool;
