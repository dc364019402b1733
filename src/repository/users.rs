//! User, role, and catalog lookups.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::PgPool;
use crate::error::CoreError;
use crate::models::{Action, User, UserRecord, WorkflowOperation, ADMIN_ROLE};
use crate::schema::{actions, user_roles, users, workflow_operations};

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up an active user with their granted roles.
    pub async fn by_username(&self, username: &str) -> Result<Option<User>, CoreError> {
        let mut conn = self.pool.get().await?;

        let record: Option<UserRecord> = users::table
            .filter(users::username.eq(username))
            .filter(users::is_active.eq(true))
            .first::<UserRecord>(&mut conn)
            .await
            .optional()?;

        let Some(record) = record else {
            return Ok(None);
        };

        let roles: Vec<String> = user_roles::table
            .filter(user_roles::user_id.eq(record.user_id))
            .select(user_roles::role)
            .load(&mut conn)
            .await?;

        Ok(Some(User::from_record(record, roles)))
    }

    /// Workflow operations visible to the given role set, in rank order.
    pub async fn operations_for(&self, user: &User) -> Result<Vec<WorkflowOperation>, CoreError> {
        let mut conn = self.pool.get().await?;
        let query = workflow_operations::table.order(workflow_operations::rank.asc());
        let ops = if user.is_admin() {
            query.load::<WorkflowOperation>(&mut conn).await?
        } else {
            query
                .filter(workflow_operations::role.eq_any(&user.roles))
                .load::<WorkflowOperation>(&mut conn)
                .await?
        };
        Ok(ops)
    }

    /// Actions visible to the given role set.
    pub async fn actions_for(&self, user: &User) -> Result<Vec<Action>, CoreError> {
        let mut conn = self.pool.get().await?;
        let query = actions::table.order(actions::action_id.asc());
        let rows = if user.is_admin() {
            query.load::<Action>(&mut conn).await?
        } else {
            let mut roles = user.roles.clone();
            // Admin-only actions stay hidden; shared ones are tagged with
            // the stage role.
            roles.retain(|r| r != ADMIN_ROLE);
            query
                .filter(actions::role.eq_any(roles))
                .load::<Action>(&mut conn)
                .await?
        };
        Ok(rows)
    }
}
