//! Role fetch raced against a fixed timeout.

use crate::model::role::Role;
use crate::model::user::UserId;
use log::warn;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Anything that can look up an account's role, possibly slowly.
pub trait RoleSource: Send + 'static {
    fn fetch_role(&self, user_id: UserId) -> Result<Option<Role>, String>;
}

impl<F> RoleSource for F
where
    F: Fn(UserId) -> Result<Option<Role>, String> + Send + 'static,
{
    fn fetch_role(&self, user_id: UserId) -> Result<Option<Role>, String> {
        self(user_id)
    }
}

/// How the session role was decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleResolution {
    Resolved(Role),
    /// Account exists without a stored role, or no longer exists.
    Missing,
    TimedOut,
    Failed(String),
}

impl RoleResolution {
    /// Effective role; everything but `Resolved` falls back to the lowest role.
    pub fn role(&self) -> Role {
        match self {
            Self::Resolved(role) => *role,
            _ => Role::lowest(),
        }
    }
}

/// Runs `source` on a worker thread and waits at most `timeout`.
///
/// A late answer is discarded; the worker finishes in the background.
pub fn fetch_role_with_timeout(
    source: impl RoleSource,
    user_id: UserId,
    timeout: Duration,
) -> RoleResolution {
    let (sender, receiver) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("archivo-role-fetch".to_string())
        .spawn(move || {
            let _ = sender.send(source.fetch_role(user_id));
        });
    if let Err(err) = spawned {
        return RoleResolution::Failed(format!("failed to spawn role fetch: {err}"));
    }

    let resolution = match receiver.recv_timeout(timeout) {
        Ok(Ok(Some(role))) => RoleResolution::Resolved(role),
        Ok(Ok(None)) => RoleResolution::Missing,
        Ok(Err(message)) => RoleResolution::Failed(message),
        Err(mpsc::RecvTimeoutError::Timeout) => RoleResolution::TimedOut,
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            RoleResolution::Failed("role fetch ended without an answer".to_string())
        }
    };

    if !matches!(resolution, RoleResolution::Resolved(_)) {
        warn!(
            "event=role_fetch module=session status=fallback user_id={} outcome={:?} timeout_ms={}",
            user_id,
            resolution,
            timeout.as_millis()
        );
    }
    resolution
}
