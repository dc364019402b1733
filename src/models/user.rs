//! User and role models.

use diesel::prelude::*;
use serde::Serialize;

use crate::schema::users;

/// Role name granting full access to every run and operation.
pub const ADMIN_ROLE: &str = "admin";

/// Raw `users` row. Never destroyed; deactivation flips `is_active`.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users, primary_key(user_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRecord {
    pub user_id: i64,
    pub username: String,
    pub password_hash: String,
    pub full_name: String,
    pub is_active: bool,
}

/// A user with their granted roles. The password hash never leaves the
/// repository layer.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub is_active: bool,
    pub roles: Vec<String>,
}

impl User {
    pub fn from_record(record: UserRecord, roles: Vec<String>) -> Self {
        Self {
            user_id: record.user_id,
            username: record.username,
            full_name: record.full_name,
            is_active: record.is_active,
            roles,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ADMIN_ROLE)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.is_admin() || self.roles.iter().any(|r| r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(roles: &[&str]) -> User {
        User {
            user_id: 1,
            username: "rcollins".to_string(),
            full_name: "Ruth Collins".to_string(),
            is_active: true,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_admin_has_every_role() {
        let u = user(&["admin"]);
        assert!(u.is_admin());
        assert!(u.has_role("collection"));
        assert!(u.has_role("qa"));
    }

    #[test]
    fn test_plain_role_check() {
        let u = user(&["collection", "load"]);
        assert!(!u.is_admin());
        assert!(u.has_role("collection"));
        assert!(!u.has_role("qa"));
    }
}
