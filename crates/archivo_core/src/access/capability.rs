//! Action capabilities granted per role.

use crate::model::role::Role;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Action-level permission checked by services and the route guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    ViewInventory,
    ManageInventory,
    InterchangeInventory,
    ViewStatistics,
    RequestLoans,
    ViewAllLoans,
    DeliverLoans,
    ResolveRequests,
    ReceiveReturns,
    ManageUsers,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::ViewInventory,
        Capability::ManageInventory,
        Capability::InterchangeInventory,
        Capability::ViewStatistics,
        Capability::RequestLoans,
        Capability::ViewAllLoans,
        Capability::DeliverLoans,
        Capability::ResolveRequests,
        Capability::ReceiveReturns,
        Capability::ManageUsers,
    ];

    /// Stable id used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ViewInventory => "inventory.view",
            Self::ManageInventory => "inventory.manage",
            Self::InterchangeInventory => "inventory.interchange",
            Self::ViewStatistics => "statistics.view",
            Self::RequestLoans => "loans.request",
            Self::ViewAllLoans => "loans.view_all",
            Self::DeliverLoans => "loans.deliver",
            Self::ResolveRequests => "loans.resolve",
            Self::ReceiveReturns => "loans.receive_returns",
            Self::ManageUsers => "users.manage",
        }
    }

    /// User-facing short description.
    pub fn description(self) -> &'static str {
        match self {
            Self::ViewInventory => "Browse the document inventory.",
            Self::ManageInventory => "Create, edit and delete inventory documents.",
            Self::InterchangeInventory => "Export and import inventory spreadsheets.",
            Self::ViewStatistics => "See aggregate inventory and loan statistics.",
            Self::RequestLoans => "Request documents on loan.",
            Self::ViewAllLoans => "See loans requested by every account.",
            Self::DeliverLoans => "Hand over requested documents.",
            Self::ResolveRequests => "Reject pending requests.",
            Self::ReceiveReturns => "Receive returned documents and sign receipts.",
            Self::ManageUsers => "Change account roles and remove accounts.",
        }
    }

    /// Roles holding this capability.
    pub fn granted_to(self) -> &'static [Role] {
        match self {
            Self::ViewInventory | Self::RequestLoans => &Role::ALL,
            Self::ManageInventory
            | Self::InterchangeInventory
            | Self::DeliverLoans
            | Self::ReceiveReturns => &[Role::Admin, Role::Archivist],
            Self::ViewStatistics | Self::ViewAllLoans | Self::ResolveRequests => {
                &[Role::Admin, Role::Archivist, Role::Supervisor]
            }
            Self::ManageUsers => &[Role::Admin],
        }
    }
}

impl Role {
    /// Whether this role holds `capability`.
    pub fn has(self, capability: Capability) -> bool {
        capability.granted_to().contains(&self)
    }

    /// All capabilities held by this role, in declaration order.
    pub fn capabilities(self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|capability| self.has(*capability))
            .collect()
    }
}

/// Rejected action for the given role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub role: Role,
    pub capability: Capability,
}

impl Display for AccessDenied {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "role `{}` lacks capability `{}`",
            self.role,
            self.capability.as_str()
        )
    }
}

impl Error for AccessDenied {}

/// Returns `Err(AccessDenied)` unless `role` holds `capability`.
pub fn ensure_capability(role: Role, capability: Capability) -> Result<(), AccessDenied> {
    if role.has(capability) {
        Ok(())
    } else {
        Err(AccessDenied { role, capability })
    }
}

#[cfg(test)]
mod tests {
    use super::{ensure_capability, Capability};
    use crate::model::role::Role;

    #[test]
    fn admin_holds_every_capability() {
        assert_eq!(Role::Admin.capabilities(), Capability::ALL.to_vec());
    }

    #[test]
    fn user_can_only_browse_and_request() {
        assert_eq!(
            Role::User.capabilities(),
            vec![Capability::ViewInventory, Capability::RequestLoans]
        );
    }

    #[test]
    fn supervisor_can_resolve_but_not_deliver() {
        ensure_capability(Role::Supervisor, Capability::ResolveRequests).unwrap();
        let denied = ensure_capability(Role::Supervisor, Capability::DeliverLoans).unwrap_err();
        assert_eq!(denied.role, Role::Supervisor);
        assert!(denied.to_string().contains("loans.deliver"));
    }
}
