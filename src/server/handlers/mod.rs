//! Request handlers.

mod api;
mod sockets;
mod source_tables;

pub use api::{
    list_actions, list_operations, ordered_tasks, pickup_run, reset_task, run_all, run_task,
    runs_for_stage, task_status,
};
pub use sockets::pipeline_run_tasks_socket;
pub use source_tables::{
    create_source_table, delete_source_table, list_source_tables, update_source_table,
};
