//! Authentication use-cases.
//!
//! # Responsibility
//! - Account sign-up, sign-in and sign-out against a [`CredentialStore`].
//! - Password recovery with expiring, single-use reset tokens.
//! - Broadcast auth state changes to subscribers.
//!
//! # Invariants
//! - Unknown email and wrong password produce the same error.
//! - Accounts created through sign-up always start with `Role::lowest()`.
//! - Resetting a password revokes every open session of the account.
//! - Log lines carry account ids only, never emails, passwords or tokens.

use crate::model::role::Role;
use crate::model::user::{normalize_email, Session, UserAccount, UserId};
use crate::repo::auth_repo::{CredentialStore, NewAccount};
use crate::repo::RepoError;
use crate::service::password::{
    hash_password, is_acceptable_password, verify_decoy, verify_password,
};
use crate::session::clock::{duration_ms, SharedClock};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug)]
pub enum AuthError {
    InvalidEmail,
    WeakPassword,
    EmailTaken,
    InvalidCredentials,
    /// Session token is unknown or was revoked.
    SessionNotFound,
    /// Reset token is unknown, expired or already used.
    InvalidResetToken,
    PasswordHash(String),
    Repo(RepoError),
}

impl AuthError {
    /// Notification text for the signed-in user.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidEmail => "Ingrese un correo electrónico válido.".to_string(),
            Self::WeakPassword => {
                "La contraseña debe tener al menos 8 caracteres.".to_string()
            }
            Self::EmailTaken => "Ya existe una cuenta con ese correo.".to_string(),
            Self::InvalidCredentials => "Correo o contraseña incorrectos.".to_string(),
            Self::SessionNotFound => {
                "Su sesión ha finalizado. Inicie sesión nuevamente.".to_string()
            }
            Self::InvalidResetToken => {
                "El enlace de recuperación no es válido o ha expirado.".to_string()
            }
            Self::PasswordHash(_) | Self::Repo(_) => {
                "No se pudo completar la operación. Intente nuevamente.".to_string()
            }
        }
    }
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEmail => write!(f, "email address is invalid"),
            Self::WeakPassword => write!(f, "password is too short"),
            Self::EmailTaken => write!(f, "email is already registered"),
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::SessionNotFound => write!(f, "session not found"),
            Self::InvalidResetToken => write!(f, "reset token is invalid or expired"),
            Self::PasswordHash(message) => write!(f, "{message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AuthError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for AuthError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Conflict { entity: "user", .. } => Self::EmailTaken,
            other => Self::Repo(other),
        }
    }
}

/// Auth state change broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn { user_id: UserId },
    SignedOut { user_id: UserId },
    /// The session was revoked after the inactivity window elapsed.
    SessionExpired { user_id: UserId },
    /// A reset token was issued for the account.
    PasswordRecovery { user_id: UserId },
    PasswordUpdated { user_id: UserId },
}

/// Fan-out of [`AuthEvent`]s. Clones share one subscriber list.
#[derive(Debug, Clone, Default)]
pub struct AuthEvents {
    subscribers: Arc<Mutex<Vec<Sender<AuthEvent>>>>,
}

impl AuthEvents {
    pub fn subscribe(&self) -> Receiver<AuthEvent> {
        let (sender, receiver) = mpsc::channel();
        match self.subscribers.lock() {
            Ok(mut guard) => guard.push(sender),
            Err(poisoned) => poisoned.into_inner().push(sender),
        }
        receiver
    }

    /// Sends to every live subscriber, dropping disconnected ones.
    pub fn publish(&self, event: &AuthEvent) {
        let mut guard = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        match self.subscribers.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Freshly issued password reset token, delivered out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetToken {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: i64,
}

/// Authentication facade over a credential store.
pub struct AuthService<S: CredentialStore> {
    store: S,
    clock: SharedClock,
    events: AuthEvents,
    reset_token_ttl: Duration,
}

impl<S: CredentialStore> AuthService<S> {
    pub fn new(
        store: S,
        clock: SharedClock,
        events: AuthEvents,
        reset_token_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            events,
            reset_token_ttl,
        }
    }

    pub fn subscribe(&self) -> Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Registers a new account with the lowest role.
    pub fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AuthResult<UserAccount> {
        self.create_account(email, password, display_name, Role::lowest())
    }

    /// Creates an account with an explicit role; used to seed the first
    /// administrator of an empty store.
    pub fn provision_account(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        role: Role,
    ) -> AuthResult<UserAccount> {
        self.create_account(email, password, display_name, role)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> AuthResult<Session> {
        let Some((account, hash)) = self.store.credentials_by_email(email)? else {
            verify_decoy(password);
            info!("event=auth_sign_in module=auth status=rejected reason=unknown_account");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &hash).map_err(AuthError::PasswordHash)? {
            info!(
                "event=auth_sign_in module=auth status=rejected reason=bad_password user_id={}",
                account.id
            );
            return Err(AuthError::InvalidCredentials);
        }

        let session = Session::new(
            new_token(),
            account.id,
            account.role,
            account.display_name,
            self.clock.now_ms(),
        );
        self.store.insert_session(&session)?;
        info!(
            "event=auth_sign_in module=auth status=ok user_id={} role={}",
            session.user_id, session.role
        );
        self.events.publish(&AuthEvent::SignedIn {
            user_id: session.user_id,
        });
        Ok(session)
    }

    /// Revokes a session token. Returns whether a session was open.
    pub fn sign_out(&self, token: &str) -> AuthResult<bool> {
        let session = self.store.get_session(token)?;
        let removed = self.store.delete_session(token)?;
        if let (true, Some(session)) = (removed, session) {
            info!(
                "event=auth_sign_out module=auth status=ok user_id={}",
                session.user_id
            );
            self.events.publish(&AuthEvent::SignedOut {
                user_id: session.user_id,
            });
        }
        Ok(removed)
    }

    /// Resolves a token with the account's current role.
    pub fn current_session(&self, token: &str) -> AuthResult<Option<Session>> {
        Ok(self.store.get_session(token)?)
    }

    /// Resolves a token and records its use.
    ///
    /// A token unused for `idle_limit` is revoked and yields `None`.
    pub fn resume_session(
        &self,
        token: &str,
        idle_limit: Duration,
    ) -> AuthResult<Option<Session>> {
        let Some(mut session) = self.store.get_session(token)? else {
            return Ok(None);
        };
        let now = self.clock.now_ms();
        if session.is_idle(now, idle_limit) {
            self.expire_session(token)?;
            return Ok(None);
        }
        self.store.touch_session(token, now)?;
        session.last_seen_at = session.last_seen_at.max(now);
        Ok(Some(session))
    }

    /// Revokes a session that timed out. Returns whether it was still open.
    pub fn expire_session(&self, token: &str) -> AuthResult<bool> {
        let session = self.store.get_session(token)?;
        let removed = self.store.delete_session(token)?;
        if let (true, Some(session)) = (removed, session) {
            info!(
                "event=auth_session_expired module=auth status=ok user_id={}",
                session.user_id
            );
            self.events.publish(&AuthEvent::SessionExpired {
                user_id: session.user_id,
            });
        }
        Ok(removed)
    }

    /// Issues a reset token, or `None` when no account uses `email`.
    pub fn request_password_reset(&self, email: &str) -> AuthResult<Option<ResetToken>> {
        let Some((account, _)) = self.store.credentials_by_email(email)? else {
            info!("event=auth_reset_request module=auth status=ignored reason=unknown_account");
            return Ok(None);
        };
        let expires_at = self
            .clock
            .now_ms()
            .saturating_add(duration_ms(self.reset_token_ttl));
        let token = new_token();
        self.store
            .insert_reset_token(&token, account.id, expires_at)?;
        info!(
            "event=auth_reset_request module=auth status=ok user_id={} expires_at={}",
            account.id, expires_at
        );
        self.events.publish(&AuthEvent::PasswordRecovery {
            user_id: account.id,
        });
        Ok(Some(ResetToken {
            token,
            user_id: account.id,
            expires_at,
        }))
    }

    /// Consumes a reset token and replaces the password.
    pub fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<UserId> {
        if !is_acceptable_password(new_password) {
            return Err(AuthError::WeakPassword);
        }
        let Some(user_id) = self
            .store
            .consume_reset_token(token, self.clock.now_ms())?
        else {
            warn!("event=auth_reset_password module=auth status=rejected reason=invalid_token");
            return Err(AuthError::InvalidResetToken);
        };

        let hash = hash_password(new_password).map_err(AuthError::PasswordHash)?;
        self.store.set_password_hash(user_id, &hash)?;
        let revoked = self.store.delete_sessions_for_user(user_id)?;
        info!(
            "event=auth_reset_password module=auth status=ok user_id={} revoked_sessions={}",
            user_id, revoked
        );
        self.events
            .publish(&AuthEvent::PasswordUpdated { user_id });
        Ok(user_id)
    }

    /// Changes the password of the signed-in account after re-checking
    /// the current one.
    pub fn update_password(
        &self,
        session: &Session,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        if self.store.get_session(&session.token)?.is_none() {
            return Err(AuthError::SessionNotFound);
        }
        if !is_acceptable_password(new_password) {
            return Err(AuthError::WeakPassword);
        }
        let hash = self
            .store
            .password_hash(session.user_id)?
            .ok_or(AuthError::SessionNotFound)?;
        if !verify_password(current_password, &hash).map_err(AuthError::PasswordHash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let hash = hash_password(new_password).map_err(AuthError::PasswordHash)?;
        self.store.set_password_hash(session.user_id, &hash)?;
        info!(
            "event=auth_update_password module=auth status=ok user_id={}",
            session.user_id
        );
        self.events.publish(&AuthEvent::PasswordUpdated {
            user_id: session.user_id,
        });
        Ok(())
    }

    fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        role: Role,
    ) -> AuthResult<UserAccount> {
        let email = normalize_email(email);
        if !is_plausible_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if !is_acceptable_password(password) {
            return Err(AuthError::WeakPassword);
        }

        let display_name = match display_name.trim() {
            "" => email.split('@').next().unwrap_or_default().to_string(),
            name => name.to_string(),
        };
        let account = self.store.create_account(&NewAccount {
            email,
            display_name,
            role,
            password_hash: hash_password(password).map_err(AuthError::PasswordHash)?,
            created_at: self.clock.now_ms(),
        })?;
        info!(
            "event=auth_sign_up module=auth status=ok user_id={} role={}",
            account.id, account.role
        );
        Ok(account)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::{is_plausible_email, AuthEvent, AuthEvents};
    use uuid::Uuid;

    #[test]
    fn email_needs_local_part_and_domain() {
        assert!(is_plausible_email("ana@archivo.gov"));
        assert!(!is_plausible_email("ana.archivo.gov"));
        assert!(!is_plausible_email("@archivo.gov"));
        assert!(!is_plausible_email("ana@"));
        assert!(!is_plausible_email("ana maria@archivo.gov"));
    }

    #[test]
    fn dropped_receivers_are_pruned_on_publish() {
        let events = AuthEvents::default();
        let kept = events.subscribe();
        let dropped = events.subscribe();
        drop(dropped);
        assert_eq!(events.subscriber_count(), 2);

        let user_id = Uuid::new_v4();
        events.publish(&AuthEvent::SignedIn { user_id });
        assert_eq!(events.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), AuthEvent::SignedIn { user_id });
    }
}
