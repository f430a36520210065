//! Service layer for archive use-cases.
//!
//! Services own authorization checks and orchestration. Persistence goes
//! through the repository traits so tests can swap implementations.

pub mod auth_service;
pub mod inventory_service;
pub mod loan_service;
pub mod password;
pub mod user_service;
