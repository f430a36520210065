//! Account repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Read models never expose `password_hash`.
//! - Email lookups use the normalized (trimmed, lowercase) form.

use crate::model::role::Role;
use crate::model::user::{normalize_email, ProfileUpdate, UserAccount, UserId};
use crate::repo::{map_foreign_key_violation, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const USER_SELECT_SQL: &str = "SELECT
    id,
    email,
    display_name,
    phone,
    unit,
    role,
    created_at
FROM users";

/// Repository interface for account reads and admin updates.
pub trait UserRepository {
    fn get_user(&self, id: UserId) -> RepoResult<Option<UserAccount>>;
    fn find_by_email(&self, email: &str) -> RepoResult<Option<UserAccount>>;
    /// Lists accounts ordered by display name.
    fn list_users(&self) -> RepoResult<Vec<UserAccount>>;
    fn get_role(&self, id: UserId) -> RepoResult<Option<Role>>;
    fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> RepoResult<()>;
    fn set_role(&self, id: UserId, role: Role) -> RepoResult<()>;
    /// Fails with `Conflict` while loans still reference the account.
    fn delete_user(&self, id: UserId) -> RepoResult<()>;
}

/// SQLite-backed account repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn get_user(&self, id: UserId) -> RepoResult<Option<UserAccount>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_user_row(row)?)),
            None => Ok(None),
        }
    }

    fn find_by_email(&self, email: &str) -> RepoResult<Option<UserAccount>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE email = ?1;"))?;
        let mut rows = stmt.query([normalize_email(email)])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_user_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_users(&self) -> RepoResult<Vec<UserAccount>> {
        let mut stmt = self.conn.prepare(&format!(
            "{USER_SELECT_SQL} ORDER BY display_name COLLATE NOCASE ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(parse_user_row(row)?);
        }
        Ok(users)
    }

    fn get_role(&self, id: UserId) -> RepoResult<Option<Role>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT role FROM users WHERE id = ?1;",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        value.map(|text| parse_role(&text)).transpose()
    }

    fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users
             SET
                display_name = COALESCE(?2, display_name),
                phone = COALESCE(?3, phone),
                unit = COALESCE(?4, unit)
             WHERE id = ?1;",
            params![
                id.to_string(),
                update.display_name.as_deref(),
                update.phone.as_deref(),
                update.unit.as_deref(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound { entity: "user", id });
        }
        Ok(())
    }

    fn set_role(&self, id: UserId, role: Role) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users SET role = ?2 WHERE id = ?1;",
            params![id.to_string(), role.as_str()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound { entity: "user", id });
        }
        Ok(())
    }

    fn delete_user(&self, id: UserId) -> RepoResult<()> {
        let key = id.to_string();
        let references: i64 = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM loans WHERE requester_id = ?1)
                  + (SELECT COUNT(*) FROM return_records WHERE received_by = ?1);",
            [key.as_str()],
            |row| row.get(0),
        )?;
        if references > 0 {
            return Err(RepoError::Conflict { entity: "user", key });
        }

        let changed = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1;", [key.as_str()])
            .map_err(|err| map_foreign_key_violation(err, "user", &key))?;
        if changed == 0 {
            return Err(RepoError::NotFound { entity: "user", id });
        }
        Ok(())
    }
}

pub(crate) fn parse_user_row(row: &Row<'_>) -> RepoResult<UserAccount> {
    let id_text: String = row.get("id")?;
    let role_text: String = row.get("role")?;
    Ok(UserAccount {
        id: parse_uuid(&id_text, "users.id")?,
        email: row.get("email")?,
        display_name: row.get("display_name")?,
        phone: row.get("phone")?,
        unit: row.get("unit")?,
        role: parse_role(&role_text)?,
        created_at: row.get("created_at")?,
    })
}

fn parse_role(value: &str) -> RepoResult<Role> {
    Role::parse(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid role `{value}` in users.role")))
}
