//! Core domain logic for the archive management system.
//! Inventory, loans, returns, accounts and access rules live here; the CLI
//! and any other front end only call into this crate.

pub mod access;
pub mod config;
pub mod context;
pub mod db;
pub mod interchange;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod session;
pub mod table;

pub use access::{authorize, visible_nav_items, Capability, NavItem, RouteDecision, View};
pub use config::{AppConfig, ConfigError};
pub use context::{AppContext, ContextError};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::document::{Conservation, Document, DocumentDraft, DocumentId};
pub use model::loan::{Loan, LoanId, LoanStatus, ReturnRecord};
pub use model::role::Role;
pub use model::user::{ProfileUpdate, Session, UserAccount, UserId};
pub use repo::document_repo::{DocumentFilter, DocumentPage, InventoryStats};
pub use repo::loan_repo::LoanListQuery;
pub use repo::{Page, RepoError, RepoResult};
pub use service::auth_service::{AuthError, AuthEvent, AuthService, ResetToken};
pub use service::inventory_service::{ImportSummary, InventoryService, InventoryServiceError};
pub use service::loan_service::{
    LoanService, LoanServiceError, NewLoanRequest, ReturnBatch, ReturnOutcome,
};
pub use service::user_service::{UserService, UserServiceError};

/// Liveness check for front ends.
pub fn ping() -> &'static str {
    "pong"
}

pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
