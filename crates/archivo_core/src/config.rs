//! Application configuration.
//!
//! # Responsibility
//! - Load `AppConfig` from a TOML file; every section and key is optional.
//! - Reject settings that would disable a timeout or the export pager.
//!
//! ```toml
//! [store]
//! path = "archivo.sqlite3"
//!
//! [logging]
//! level = "info"
//! dir = "logs"
//!
//! [session]
//! inactivity_timeout_secs = 1800
//! warning_secs = 5
//! poll_interval_secs = 60
//! role_fetch_timeout_ms = 5000
//!
//! [auth]
//! reset_token_ttl_secs = 3600
//!
//! [loans]
//! default_loan_days = 15
//!
//! [interchange]
//! export_batch_size = 500
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config file: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub session: SessionConfig,
    pub auth: AuthConfig,
    pub loans: LoanConfig,
    pub interchange: InterchangeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("archivo.sqlite3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `trace|debug|info|warn|error`; build-mode default when unset.
    pub level: Option<String>,
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub inactivity_timeout_secs: u64,
    pub warning_secs: u64,
    pub poll_interval_secs: u64,
    pub role_fetch_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 30 * 60,
            warning_secs: 5,
            poll_interval_secs: 60,
            role_fetch_timeout_ms: 5_000,
        }
    }
}

impl SessionConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn warning(&self) -> Duration {
        Duration::from_secs(self.warning_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn role_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.role_fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub reset_token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            reset_token_ttl_secs: 60 * 60,
        }
    }
}

impl AuthConfig {
    pub fn reset_token_ttl(&self) -> Duration {
        Duration::from_secs(self.reset_token_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoanConfig {
    pub default_loan_days: u32,
}

impl Default for LoanConfig {
    fn default() -> Self {
        Self {
            default_loan_days: 15,
        }
    }
}

impl LoanConfig {
    pub fn default_loan_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.default_loan_days) * 24 * 60 * 60)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterchangeConfig {
    /// Rows per listing page during export; the listing maximum applies.
    pub export_batch_size: u32,
}

impl Default for InterchangeConfig {
    fn default() -> Self {
        Self {
            export_batch_size: 500,
        }
    }
}

impl AppConfig {
    /// Reads and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Loads `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("session.inactivity_timeout_secs", self.session.inactivity_timeout_secs),
            ("session.warning_secs", self.session.warning_secs),
            ("session.poll_interval_secs", self.session.poll_interval_secs),
            ("session.role_fetch_timeout_ms", self.session.role_fetch_timeout_ms),
            ("auth.reset_token_ttl_secs", self.auth.reset_token_ttl_secs),
            ("loans.default_loan_days", u64::from(self.loans.default_loan_days)),
            (
                "interchange.export_batch_size",
                u64::from(self.interchange.export_batch_size),
            ),
        ];
        for (key, value) in durations {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("`{key}` must be greater than zero")));
            }
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("`store.path` cannot be empty".to_string()));
        }
        Ok(())
    }
}
