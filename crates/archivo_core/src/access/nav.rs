//! Navigation items and their role visibility.

use crate::model::role::Role;

/// One entry of the main navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavItem {
    pub id: &'static str,
    pub label: &'static str,
    pub path: &'static str,
    /// `None` means any authenticated role.
    pub allowed: Option<&'static [Role]>,
}

const STAFF: &[Role] = &[Role::Admin, Role::Archivist, Role::Supervisor];
const ARCHIVE_STAFF: &[Role] = &[Role::Admin, Role::Archivist];
const ADMINS: &[Role] = &[Role::Admin];

/// Main navigation, in display order.
pub const NAV_ITEMS: &[NavItem] = &[
    NavItem {
        id: "home",
        label: "Inicio",
        path: "/",
        allowed: None,
    },
    NavItem {
        id: "inventory",
        label: "Inventario",
        path: "/inventario",
        allowed: None,
    },
    NavItem {
        id: "my_requests",
        label: "Mis solicitudes",
        path: "/solicitudes",
        allowed: None,
    },
    NavItem {
        id: "loans",
        label: "Préstamos",
        path: "/prestamos",
        allowed: Some(STAFF),
    },
    NavItem {
        id: "returns",
        label: "Devoluciones",
        path: "/devoluciones",
        allowed: Some(ARCHIVE_STAFF),
    },
    NavItem {
        id: "statistics",
        label: "Estadísticas",
        path: "/estadisticas",
        allowed: Some(STAFF),
    },
    NavItem {
        id: "import",
        label: "Importar inventario",
        path: "/importar",
        allowed: Some(ARCHIVE_STAFF),
    },
    NavItem {
        id: "users",
        label: "Usuarios",
        path: "/usuarios",
        allowed: Some(ADMINS),
    },
];

/// `true` iff the item declares no role set or `role` is in it.
pub fn is_visible(item: &NavItem, role: Role) -> bool {
    match item.allowed {
        None => true,
        Some(roles) => roles.contains(&role),
    }
}

/// Navigation entries visible to `role`, in display order.
pub fn visible_nav_items(role: Role) -> Vec<&'static NavItem> {
    NAV_ITEMS
        .iter()
        .filter(|item| is_visible(item, role))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{visible_nav_items, NAV_ITEMS};
    use crate::model::role::Role;
    use std::collections::HashSet;

    #[test]
    fn item_ids_and_paths_are_unique() {
        let ids = NAV_ITEMS.iter().map(|item| item.id).collect::<HashSet<_>>();
        let paths = NAV_ITEMS.iter().map(|item| item.path).collect::<HashSet<_>>();
        assert_eq!(ids.len(), NAV_ITEMS.len());
        assert_eq!(paths.len(), NAV_ITEMS.len());
    }

    #[test]
    fn user_sees_only_open_items() {
        let ids = visible_nav_items(Role::User)
            .into_iter()
            .map(|item| item.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["home", "inventory", "my_requests"]);
    }

    #[test]
    fn admin_sees_everything() {
        assert_eq!(visible_nav_items(Role::Admin).len(), NAV_ITEMS.len());
    }
}
