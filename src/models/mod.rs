//! Domain models for pipeline runs, tasks, users, and source tables.

mod operation;
mod run;
mod source_table;
mod task;
mod user;

pub use operation::{Action, WorkflowOperation};
pub use run::{OperationState, PipelineRun, WorkflowStage};
pub use source_table::{
    CollectType, LoaderType, SourceTable, SourceTableColumn, SourceTableForm,
};
pub use task::{PipelineRunTask, TaskCatalogEntry, TaskRunType, TaskStatus};
pub use user::{User, UserRecord, ADMIN_ROLE};

/// Implement diesel's Pg enum serialization for a model enum with
/// `as_str`/`from_str` methods against a `schema::sql_types` marker type.
macro_rules! pg_enum {
    ($model:ty, $sql:ty) => {
        impl diesel::serialize::ToSql<$sql, diesel::pg::Pg> for $model {
            fn to_sql<'b>(
                &'b self,
                out: &mut diesel::serialize::Output<'b, '_, diesel::pg::Pg>,
            ) -> diesel::serialize::Result {
                use std::io::Write;
                out.write_all(self.as_str().as_bytes())?;
                Ok(diesel::serialize::IsNull::No)
            }
        }

        impl diesel::deserialize::FromSql<$sql, diesel::pg::Pg> for $model {
            fn from_sql(bytes: diesel::pg::PgValue<'_>) -> diesel::deserialize::Result<Self> {
                let s = std::str::from_utf8(bytes.as_bytes())?;
                Self::from_str(s)
                    .ok_or_else(|| format!("unrecognized enum value: {s}").into())
            }
        }
    };
}

pub(crate) use pg_enum;
