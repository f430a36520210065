//! Application context.
//!
//! # Responsibility
//! - Own the store connection, configuration, clock and auth event hub.
//! - Hold the signed-in session explicitly instead of in process globals.
//! - Hand out services bound to the connection.
//!
//! # Invariants
//! - The session role is re-resolved on sign-in and restore; a slow or
//!   failing lookup downgrades the session to `Role::lowest()`.
//! - Route and navigation decisions use the held session only.
//! - Once the inactivity watchdog fires, the held session counts as signed
//!   out; the next [`AppContext::enforce_session_expiry`] revokes its token.
//! - A stored token idle for longer than the inactivity window plus the
//!   warning is revoked instead of restored.

use crate::access::{authorize, visible_nav_items, NavItem, RouteDecision};
use crate::config::AppConfig;
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::user::{Session, UserId};
use crate::repo::auth_repo::SqliteCredentialStore;
use crate::repo::document_repo::SqliteDocumentRepository;
use crate::repo::loan_repo::SqliteLoanRepository;
use crate::repo::user_repo::{SqliteUserRepository, UserRepository};
use crate::service::auth_service::{AuthError, AuthEvents, AuthService};
use crate::service::inventory_service::InventoryService;
use crate::service::loan_service::LoanService;
use crate::service::user_service::UserService;
use crate::session::{
    fetch_role_with_timeout, InactivityMonitor, RoleResolution, SharedClock, SystemClock,
    Watchdog,
};
use log::info;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub enum ContextError {
    Db(DbError),
    Auth(AuthError),
    NotSignedIn,
    /// The inactivity window elapsed for the held session.
    SessionExpired,
    Watchdog(std::io::Error),
}

impl ContextError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Db(_) => "No se pudo abrir el almacenamiento.".to_string(),
            Self::Auth(err) => err.user_message(),
            Self::NotSignedIn => "Debe iniciar sesión para continuar.".to_string(),
            Self::SessionExpired => {
                "La sesión expiró por inactividad. Inicie sesión de nuevo.".to_string()
            }
            Self::Watchdog(_) => "No se pudo vigilar la inactividad de la sesión.".to_string(),
        }
    }
}

impl Display for ContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Auth(err) => write!(f, "{err}"),
            Self::NotSignedIn => write!(f, "no active session"),
            Self::SessionExpired => write!(f, "session expired after inactivity"),
            Self::Watchdog(err) => write!(f, "failed to start inactivity watchdog: {err}"),
        }
    }
}

impl Error for ContextError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Auth(err) => Some(err),
            Self::Watchdog(err) => Some(err),
            Self::NotSignedIn | Self::SessionExpired => None,
        }
    }
}

impl From<DbError> for ContextError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<AuthError> for ContextError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

pub struct AppContext {
    config: AppConfig,
    conn: Connection,
    /// File-backed stores let the role lookup use its own connection.
    store_path: Option<PathBuf>,
    clock: SharedClock,
    auth_events: AuthEvents,
    session: Option<Session>,
    /// Set by the watchdog of the held session. Replaced on every session
    /// change so a stale watchdog cannot expire a newer session.
    expired: Arc<AtomicBool>,
}

impl AppContext {
    /// Opens the configured file store.
    pub fn open(config: AppConfig) -> Result<Self, ContextError> {
        let conn = open_db(&config.store.path)?;
        let store_path = Some(config.store.path.clone());
        Ok(Self::build(config, conn, store_path, Arc::new(SystemClock)))
    }

    /// Context over a private in-memory store.
    pub fn in_memory(config: AppConfig, clock: SharedClock) -> Result<Self, ContextError> {
        let conn = open_db_in_memory()?;
        Ok(Self::build(config, conn, None, clock))
    }

    fn build(
        config: AppConfig,
        conn: Connection,
        store_path: Option<PathBuf>,
        clock: SharedClock,
    ) -> Self {
        Self {
            config,
            conn,
            store_path,
            clock,
            auth_events: AuthEvents::default(),
            session: None,
            expired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.clock)
    }

    pub fn auth_events(&self) -> &AuthEvents {
        &self.auth_events
    }

    pub fn auth(&self) -> AuthService<SqliteCredentialStore<'_>> {
        AuthService::new(
            SqliteCredentialStore::new(&self.conn),
            self.clock(),
            self.auth_events.clone(),
            self.config.auth.reset_token_ttl(),
        )
    }

    pub fn users(&self) -> UserService<SqliteUserRepository<'_>> {
        UserService::new(SqliteUserRepository::new(&self.conn))
    }

    pub fn inventory(&self) -> InventoryService<SqliteDocumentRepository<'_>> {
        InventoryService::new(SqliteDocumentRepository::new(&self.conn), self.clock())
    }

    pub fn loans(&self) -> LoanService<SqliteLoanRepository<'_>> {
        LoanService::new(
            SqliteLoanRepository::new(&self.conn),
            self.clock(),
            self.config.loans.default_loan_period(),
        )
    }

    /// The held session, unless the inactivity watchdog expired it.
    pub fn session(&self) -> Option<&Session> {
        if self.is_session_expired() {
            return None;
        }
        self.session.as_ref()
    }

    pub fn require_session(&self) -> Result<&Session, ContextError> {
        match &self.session {
            Some(_) if self.is_session_expired() => Err(ContextError::SessionExpired),
            Some(session) => Ok(session),
            None => Err(ContextError::NotSignedIn),
        }
    }

    /// Whether the watchdog expired the held session.
    pub fn is_session_expired(&self) -> bool {
        self.session.is_some() && self.expired.load(Ordering::SeqCst)
    }

    /// Signs in and holds the resulting session.
    pub fn sign_in(&mut self, email: &str, password: &str) -> Result<&Session, ContextError> {
        let mut session = self.auth().sign_in(email, password)?;
        session.role = self.resolve_role(session.user_id).role();
        Ok(self.hold(session))
    }

    /// Re-attaches a previously issued token. `None` when it was revoked or
    /// sat unused past the inactivity window.
    pub fn restore_session(&mut self, token: &str) -> Result<Option<&Session>, ContextError> {
        let stored = self.auth().resume_session(token, self.idle_limit())?;
        let Some(mut session) = stored else {
            self.release();
            return Ok(None);
        };
        session.role = self.resolve_role(session.user_id).role();
        Ok(Some(self.hold(session)))
    }

    /// Revokes and drops the held session.
    pub fn sign_out(&mut self) -> Result<bool, ContextError> {
        let Some(session) = self.release() else {
            return Ok(false);
        };
        Ok(self.auth().sign_out(&session.token)?)
    }

    /// Revokes the held session when its watchdog fired. Returns whether it
    /// did.
    pub fn enforce_session_expiry(&mut self) -> Result<bool, ContextError> {
        if !self.is_session_expired() {
            return Ok(false);
        }
        let Some(session) = self.release() else {
            return Ok(false);
        };
        self.auth().expire_session(&session.token)?;
        info!(
            "event=session_expiry_enforced module=context user_id={}",
            session.user_id
        );
        Ok(true)
    }

    /// Drops the held session without touching the store.
    pub fn clear_session(&mut self) {
        self.release();
    }

    fn hold(&mut self, session: Session) -> &Session {
        self.expired = Arc::new(AtomicBool::new(false));
        self.session.insert(session)
    }

    fn release(&mut self) -> Option<Session> {
        self.expired = Arc::new(AtomicBool::new(false));
        self.session.take()
    }

    fn idle_limit(&self) -> Duration {
        let settings = &self.config.session;
        settings.inactivity_timeout().saturating_add(settings.warning())
    }

    /// Route decision for the held session; an expired session is treated
    /// as signed out.
    pub fn authorize(&self, path: &str) -> RouteDecision {
        authorize(path, self.session())
    }

    /// Navigation entries for the held session; empty when signed out.
    pub fn nav_items(&self) -> Vec<&'static NavItem> {
        self.session()
            .map(|session| visible_nav_items(session.role))
            .unwrap_or_default()
    }

    /// Looks up the stored role within the configured timeout.
    pub fn resolve_role(&self, user_id: UserId) -> RoleResolution {
        let timeout = self.config.session.role_fetch_timeout();
        let resolution = match &self.store_path {
            Some(path) => {
                let path = path.clone();
                fetch_role_with_timeout(
                    move |user_id: UserId| {
                        let conn = open_db(&path).map_err(|err| err.to_string())?;
                        SqliteUserRepository::new(&conn)
                            .get_role(user_id)
                            .map_err(|err| err.to_string())
                    },
                    user_id,
                    timeout,
                )
            }
            None => match SqliteUserRepository::new(&self.conn).get_role(user_id) {
                Ok(Some(role)) => RoleResolution::Resolved(role),
                Ok(None) => RoleResolution::Missing,
                Err(err) => RoleResolution::Failed(err.to_string()),
            },
        };
        info!(
            "event=role_resolve module=context user_id={} role={}",
            user_id,
            resolution.role()
        );
        resolution
    }

    /// Starts the inactivity watchdog for the held session.
    ///
    /// On expiry the session stops counting as signed in and `on_expire`
    /// runs on the watchdog thread.
    pub fn start_inactivity_watchdog<F>(&self, on_expire: F) -> Result<Watchdog, ContextError>
    where
        F: FnOnce() + Send + 'static,
    {
        let session = self.require_session()?;
        let settings = &self.config.session;
        let monitor = InactivityMonitor::new(
            settings.inactivity_timeout(),
            settings.warning(),
            self.clock.now_ms().max(session.last_seen_at),
        );
        let expired = Arc::clone(&self.expired);
        Watchdog::spawn(monitor, self.clock(), settings.poll_interval(), move || {
            expired.store(true, Ordering::SeqCst);
            on_expire();
        })
        .map_err(ContextError::Watchdog)
    }
}
