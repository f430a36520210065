//! Credential, session and reset-token storage.
//!
//! # Responsibility
//! - Persist account credentials and opaque session/reset tokens.
//! - Resolve a session token to the account's current role and name.
//!
//! # Invariants
//! - Password hashes are only read through this contract.
//! - A reset token is consumed at most once and never after `expires_at`.

use crate::model::role::Role;
use crate::model::user::{normalize_email, Session, UserAccount, UserId};
use crate::repo::user_repo::parse_user_row;
use crate::repo::{map_unique_violation, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Account creation payload with an already-hashed password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub password_hash: String,
    pub created_at: i64,
}

/// Storage contract behind the authentication service.
pub trait CredentialStore {
    fn create_account(&self, account: &NewAccount) -> RepoResult<UserAccount>;
    /// Returns the account and its password hash for a sign-in attempt.
    fn credentials_by_email(&self, email: &str) -> RepoResult<Option<(UserAccount, String)>>;
    fn password_hash(&self, user_id: UserId) -> RepoResult<Option<String>>;
    fn set_password_hash(&self, user_id: UserId, password_hash: &str) -> RepoResult<()>;
    fn insert_session(&self, session: &Session) -> RepoResult<()>;
    /// Resolves a token with the account's current role and display name.
    fn get_session(&self, token: &str) -> RepoResult<Option<Session>>;
    /// Records use of a token. Returns whether the session exists.
    fn touch_session(&self, token: &str, now: i64) -> RepoResult<bool>;
    /// Returns whether a session row was removed.
    fn delete_session(&self, token: &str) -> RepoResult<bool>;
    fn delete_sessions_for_user(&self, user_id: UserId) -> RepoResult<usize>;
    fn insert_reset_token(&self, token: &str, user_id: UserId, expires_at: i64) -> RepoResult<()>;
    /// Marks a valid token as used and returns its account.
    fn consume_reset_token(&self, token: &str, now: i64) -> RepoResult<Option<UserId>>;
}

/// SQLite-backed credential store.
pub struct SqliteCredentialStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCredentialStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CredentialStore for SqliteCredentialStore<'_> {
    fn create_account(&self, account: &NewAccount) -> RepoResult<UserAccount> {
        let id = Uuid::new_v4();
        let email = normalize_email(&account.email);
        self.conn
            .execute(
                "INSERT INTO users (
                    id,
                    email,
                    display_name,
                    role,
                    password_hash,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    id.to_string(),
                    email.as_str(),
                    account.display_name.trim(),
                    account.role.as_str(),
                    account.password_hash.as_str(),
                    account.created_at,
                ],
            )
            .map_err(|err| map_unique_violation(err, "user", &email))?;

        Ok(UserAccount {
            id,
            email,
            display_name: account.display_name.trim().to_string(),
            phone: None,
            unit: None,
            role: account.role,
            created_at: account.created_at,
        })
    }

    fn credentials_by_email(&self, email: &str) -> RepoResult<Option<(UserAccount, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id,
                email,
                display_name,
                phone,
                unit,
                role,
                created_at,
                password_hash
             FROM users
             WHERE email = ?1;",
        )?;
        let mut rows = stmt.query([normalize_email(email)])?;
        match rows.next()? {
            Some(row) => {
                let account = parse_user_row(row)?;
                let hash: String = row.get("password_hash")?;
                Ok(Some((account, hash)))
            }
            None => Ok(None),
        }
    }

    fn password_hash(&self, user_id: UserId) -> RepoResult<Option<String>> {
        let hash = self
            .conn
            .query_row(
                "SELECT password_hash FROM users WHERE id = ?1;",
                [user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    fn set_password_hash(&self, user_id: UserId, password_hash: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users SET password_hash = ?2 WHERE id = ?1;",
            params![user_id.to_string(), password_hash],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "user",
                id: user_id,
            });
        }
        Ok(())
    }

    fn insert_session(&self, session: &Session) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                session.token.as_str(),
                session.user_id.to_string(),
                session.created_at,
                session.last_seen_at,
            ],
        )?;
        Ok(())
    }

    fn get_session(&self, token: &str) -> RepoResult<Option<Session>> {
        let row = self
            .conn
            .query_row(
                "SELECT s.token, s.user_id, s.created_at, s.last_seen_at, u.role, u.display_name
                 FROM sessions s
                 INNER JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1;",
                [token],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((token, user_id, created_at, last_seen_at, role, display_name)) = row else {
            return Ok(None);
        };
        let role = Role::parse(&role)
            .map_err(|_| RepoError::InvalidData(format!("invalid role `{role}` in users.role")))?;
        Ok(Some(Session {
            token,
            user_id: parse_uuid(&user_id, "sessions.user_id")?,
            role,
            display_name,
            created_at,
            last_seen_at,
        }))
    }

    fn touch_session(&self, token: &str, now: i64) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE sessions SET last_seen_at = MAX(last_seen_at, ?2) WHERE token = ?1;",
            params![token, now],
        )?;
        Ok(changed > 0)
    }

    fn delete_session(&self, token: &str) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?1;", [token])?;
        Ok(changed > 0)
    }

    fn delete_sessions_for_user(&self, user_id: UserId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM sessions WHERE user_id = ?1;",
            [user_id.to_string()],
        )?;
        Ok(changed)
    }

    fn insert_reset_token(&self, token: &str, user_id: UserId, expires_at: i64) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO password_resets (token, user_id, expires_at) VALUES (?1, ?2, ?3);",
            params![token, user_id.to_string(), expires_at],
        )?;
        Ok(())
    }

    fn consume_reset_token(&self, token: &str, now: i64) -> RepoResult<Option<UserId>> {
        let tx = self.conn.unchecked_transaction()?;
        let user_id: Option<String> = tx
            .query_row(
                "SELECT user_id
                 FROM password_resets
                 WHERE token = ?1
                   AND used = 0
                   AND expires_at > ?2;",
                params![token, now],
                |row| row.get(0),
            )
            .optional()?;

        let Some(user_id) = user_id else {
            return Ok(None);
        };
        tx.execute(
            "UPDATE password_resets SET used = 1 WHERE token = ?1;",
            [token],
        )?;
        tx.commit()?;
        Ok(Some(parse_uuid(&user_id, "password_resets.user_id")?))
    }
}
