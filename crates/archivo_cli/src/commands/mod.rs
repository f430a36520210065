//! Subcommand implementations and shared CLI runtime.

pub mod account;
pub mod doc;
pub mod loan;
pub mod nav;

use archivo_core::{
    AppConfig, AppContext, AuthError, ConfigError, ContextError, InventoryServiceError,
    LoanServiceError, Session, UserServiceError,
};
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum CliError {
    Config(ConfigError),
    Logging(String),
    Context(ContextError),
    Auth(AuthError),
    User(UserServiceError),
    Inventory(InventoryServiceError),
    Loan(LoanServiceError),
    Io(std::io::Error),
    Usage(String),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Logging(message) => write!(f, "logging setup failed: {message}"),
            Self::Context(err) => write!(f, "{} ({err})", err.user_message()),
            Self::Auth(err) => write!(f, "{} ({err})", err.user_message()),
            Self::User(err) => write!(f, "{} ({err})", err.user_message()),
            Self::Inventory(err) => write!(f, "{} ({err})", err.user_message()),
            Self::Loan(err) => write!(f, "{} ({err})", err.user_message()),
            Self::Io(err) => write!(f, "{err}"),
            Self::Usage(message) => write!(f, "{message}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Context(err) => Some(err),
            Self::Auth(err) => Some(err),
            Self::User(err) => Some(err),
            Self::Inventory(err) => Some(err),
            Self::Loan(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Logging(_) | Self::Usage(_) => None,
        }
    }
}

macro_rules! cli_error_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for CliError {
                fn from(value: $source) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

cli_error_from! {
    ConfigError => Config,
    ContextError => Context,
    AuthError => Auth,
    UserServiceError => User,
    InventoryServiceError => Inventory,
    LoanServiceError => Loan,
    std::io::Error => Io,
}

/// Opened context plus the file that remembers the session token.
pub struct Runtime {
    ctx: AppContext,
    session_file: PathBuf,
}

impl Runtime {
    pub fn open(config_path: &Path) -> Result<Self, CliError> {
        let config = AppConfig::load_or_default(config_path)?;
        archivo_core::init_from_config(&config.logging).map_err(CliError::Logging)?;
        let session_file = session_file_for(&config.store.path);

        let mut ctx = AppContext::open(config)?;
        if let Ok(token) = fs::read_to_string(&session_file) {
            if ctx.restore_session(token.trim())?.is_none() {
                info!("event=cli_session_dropped module=cli reason=revoked_or_idle");
                eprintln!("saved session expired or was revoked; sign in again");
                let _ = fs::remove_file(&session_file);
            }
        }
        info!(
            "event=cli_start module=cli status=ok signed_in={}",
            ctx.session().is_some()
        );
        Ok(Self { ctx, session_file })
    }

    pub fn ctx(&self) -> &AppContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut AppContext {
        &mut self.ctx
    }

    pub fn session(&self) -> Result<&Session, CliError> {
        Ok(self.ctx.require_session()?)
    }

    pub fn remember(&self, session: &Session) -> Result<(), CliError> {
        fs::write(&self.session_file, &session.token)?;
        Ok(())
    }

    pub fn forget(&self) -> Result<(), CliError> {
        match fs::remove_file(&self.session_file) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn session_file_for(store_path: &Path) -> PathBuf {
    let mut name = store_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "archivo".into());
    name.push(".session");
    store_path.with_file_name(name)
}

pub(crate) fn format_timestamp(epoch_ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(epoch_ms) {
        Some(at) => at.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => epoch_ms.to_string(),
    }
}

/// Parses a `YYYY-MM-DD` due date as the end of that UTC day.
pub(crate) fn parse_due_date(value: &str) -> Result<i64, CliError> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| CliError::Usage(format!("invalid date `{value}`: {err}")))?;
    let end_of_day = date
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| CliError::Usage(format!("invalid date `{value}`")))?;
    Ok(end_of_day.and_utc().timestamp_millis())
}
