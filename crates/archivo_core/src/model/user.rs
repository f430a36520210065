//! Account and session read models.

use crate::model::role::Role;
use crate::session::clock::duration_ms;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub type UserId = Uuid;

/// Account read model. The credential hash never leaves the auth store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    /// Lowercased, trimmed, unique.
    pub email: String,
    pub display_name: String,
    pub phone: Option<String>,
    /// Organizational unit the account belongs to.
    pub unit: Option<String>,
    pub role: Role,
    pub created_at: i64,
}

/// Authenticated session held by the application context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token.
    pub token: String,
    pub user_id: UserId,
    pub role: Role,
    pub display_name: String,
    pub created_at: i64,
    /// Last time the token was used.
    pub last_seen_at: i64,
}

impl Session {
    /// Builds a session for an already-authenticated account.
    pub fn new(
        token: impl Into<String>,
        user_id: UserId,
        role: Role,
        display_name: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            token: token.into(),
            user_id,
            role,
            display_name: display_name.into(),
            created_at,
            last_seen_at: created_at,
        }
    }

    /// Whether the token has gone unused for at least `idle_limit`.
    pub fn is_idle(&self, now_ms: i64, idle_limit: Duration) -> bool {
        now_ms.saturating_sub(self.last_seen_at) >= duration_ms(idle_limit)
    }
}

/// Mutable profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub unit: Option<String>,
}

/// Normalizes an email address for storage and lookup.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}
