//! Account roles.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Fixed role set that gates navigation, routes and actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[serde(rename = "archivero")]
    Archivist,
    Supervisor,
    #[serde(rename = "usuario")]
    User,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Archivist, Role::Supervisor, Role::User];

    /// Stored string id.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Archivist => "archivero",
            Self::Supervisor => "supervisor",
            Self::User => "usuario",
        }
    }

    /// User-facing label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Admin => "Administrador",
            Self::Archivist => "Archivero",
            Self::Supervisor => "Supervisor",
            Self::User => "Usuario",
        }
    }

    /// Lowest-privilege role, used whenever the real role cannot be resolved.
    pub fn lowest() -> Self {
        Self::User
    }

    /// Parses a stored or user-typed role id.
    ///
    /// Accepts the stored Spanish ids and their English aliases, case-insensitive.
    pub fn parse(value: &str) -> Result<Self, RoleParseError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" | "administrador" => Ok(Self::Admin),
            "archivero" | "archivist" => Ok(Self::Archivist),
            "supervisor" => Ok(Self::Supervisor),
            "usuario" | "user" => Ok(Self::User),
            "" => Err(RoleParseError::Empty),
            other => Err(RoleParseError::Unknown(other.to_string())),
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleParseError {
    Empty,
    Unknown(String),
}

impl Display for RoleParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "role must not be empty"),
            Self::Unknown(value) => write!(f, "unknown role: {value}"),
        }
    }
}

impl Error for RoleParseError {}

#[cfg(test)]
mod tests {
    use super::{Role, RoleParseError};

    #[test]
    fn parse_accepts_stored_ids_and_aliases() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()).unwrap(), role);
        }
        assert_eq!(Role::parse(" Archivist ").unwrap(), Role::Archivist);
        assert_eq!(Role::parse("USER").unwrap(), Role::User);
    }

    #[test]
    fn parse_rejects_blank_and_unknown() {
        assert_eq!(Role::parse("  ").unwrap_err(), RoleParseError::Empty);
        assert_eq!(
            Role::parse("root").unwrap_err(),
            RoleParseError::Unknown("root".to_string())
        );
    }

    #[test]
    fn serde_names_match_stored_ids() {
        for role in Role::ALL {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
        }
    }
}
