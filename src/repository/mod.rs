//! Database access layer: pool plus per-entity repositories.

mod pool;
mod runs;
pub(crate) mod source_tables;
pub(crate) mod tasks;
mod users;

pub use pool::{PgConn, PgPool};
pub use runs::RunRepository;
pub use source_tables::{Flag, NewColumnStat, SourceTableRepository};
pub use tasks::TaskRepository;
pub use users::UserRepository;

/// Whether a diesel error is PostgreSQL's "lock not available" (a
/// `NOWAIT` lock acquisition losing the race, SQLSTATE 55P03).
pub fn is_lock_unavailable(err: &diesel::result::Error) -> bool {
    match err {
        diesel::result::Error::DatabaseError(_, info) => {
            info.message().contains("could not obtain lock")
        }
        _ => false,
    }
}
