//! Data-access boundary and its SQLite implementation.
//!
//! # Responsibility
//! - Define use-case oriented contracts for the backend tables and the two
//!   inventory query functions.
//! - Keep SQL details out of service orchestration.
//!
//! # Invariants
//! - Write paths validate drafts before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Multi-row writes run inside one transaction.

use crate::db::DbError;
use crate::model::document::DocumentValidationError;
use crate::model::loan::LoanValidationError;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod auth_repo;
pub mod document_repo;
pub mod loan_repo;
pub mod user_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by every table contract.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound { entity: &'static str, id: Uuid },
    /// Unique key already taken, e.g. a document code or an email.
    Conflict { entity: &'static str, key: String },
    DocumentValidation(DocumentValidationError),
    LoanValidation(LoanValidationError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict { entity, key } => write!(f, "{entity} already exists: {key}"),
            Self::DocumentValidation(err) => write!(f, "{err}"),
            Self::LoanValidation(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::DocumentValidation(err) => Some(err),
            Self::LoanValidation(err) => Some(err),
            Self::NotFound { .. } | Self::Conflict { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<DocumentValidationError> for RepoError {
    fn from(value: DocumentValidationError) -> Self {
        Self::DocumentValidation(value)
    }
}

impl From<LoanValidationError> for RepoError {
    fn from(value: LoanValidationError) -> Self {
        Self::LoanValidation(value)
    }
}

/// Query window shared by list operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    /// Maximum rows; `None` applies the contract default.
    pub limit: Option<u32>,
    pub offset: u32,
}

impl Page {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }
}

/// Clamps a requested limit into `1..=max`, with `default` for `None`/`0`.
pub fn normalize_limit(limit: Option<u32>, default: u32, max: u32) -> u32 {
    match limit {
        Some(0) | None => default,
        Some(value) if value > max => max,
        Some(value) => value,
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn parse_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

/// Maps a UNIQUE violation to `Conflict`, anything else to `Db`.
pub(crate) fn map_unique_violation(
    err: rusqlite::Error,
    entity: &'static str,
    key: &str,
) -> RepoError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            RepoError::Conflict {
                entity,
                key: key.to_string(),
            }
        }
        _ => RepoError::from(err),
    }
}

/// Maps a FOREIGN KEY violation to `Conflict`, anything else to `Db`.
///
/// Immediate `ON DELETE RESTRICT` actions report `SQLITE_CONSTRAINT_TRIGGER`
/// rather than `SQLITE_CONSTRAINT_FOREIGNKEY`.
pub(crate) fn map_foreign_key_violation(
    err: rusqlite::Error,
    entity: &'static str,
    key: &str,
) -> RepoError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
                        | rusqlite::ffi::SQLITE_CONSTRAINT_TRIGGER
                ) =>
        {
            RepoError::Conflict {
                entity,
                key: key.to_string(),
            }
        }
        _ => RepoError::from(err),
    }
}
