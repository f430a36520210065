//! Session lifetime rules: timed role resolution and inactivity expiry.
//!
//! # Responsibility
//! - Resolve the signed-in account's role without blocking indefinitely.
//! - Track user activity and decide when an idle session must end.
//!
//! # Invariants
//! - A role that cannot be fetched in time resolves to `Role::lowest()`.
//! - An idle session is signed out within one poll interval plus the
//!   warning duration after crossing the inactivity threshold.

pub mod clock;
pub mod monitor;
pub mod role_fetch;
pub mod watchdog;

pub use clock::{duration_ms, Clock, ManualClock, SharedClock, SystemClock};
pub use monitor::{ActivityKind, InactivityMonitor, WatchState};
pub use role_fetch::{fetch_role_with_timeout, RoleResolution, RoleSource};
pub use watchdog::Watchdog;
