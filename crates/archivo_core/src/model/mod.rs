//! Domain model for the archive: accounts, inventory documents and loans.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Hold pure lifecycle rules that do not need storage access.
//!
//! # Invariants
//! - Every entity is identified by a stable UUID.
//! - Timestamps are Unix epoch milliseconds.

pub mod document;
pub mod loan;
pub mod role;
pub mod user;
