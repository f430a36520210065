//! Role-based access: capabilities, navigation visibility and route guard.
//!
//! # Responsibility
//! - Map roles to the actions they may perform.
//! - Keep navigation and route requirements in declarative tables.
//! - Decide every route dispatch in one place.

pub mod capability;
pub mod nav;
pub mod routes;

pub use capability::{ensure_capability, AccessDenied, Capability};
pub use nav::{is_visible, visible_nav_items, NavItem, NAV_ITEMS};
pub use routes::{authorize, RouteDecision, RouteRequirement, RouteRule, View, ROUTES};
