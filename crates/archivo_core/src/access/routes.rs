//! Declarative route table and the single dispatch guard.
//!
//! # Invariants
//! - Anonymous access to a non-public route redirects to login.
//! - Authenticated access without the required capability redirects home.
//! - Authenticated access to the login view redirects home.

use crate::access::capability::Capability;
use crate::model::user::Session;
use log::debug;

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/";

/// Views served by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Login,
    Register,
    ForgotPassword,
    ResetPassword,
    Home,
    Inventory,
    MyRequests,
    Loans,
    Returns,
    Statistics,
    Import,
    Users,
    Profile,
}

/// Access requirement for one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteRequirement {
    Public,
    Authenticated,
    Capability(Capability),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRule {
    pub path: &'static str,
    pub view: View,
    pub requirement: RouteRequirement,
}

/// Dispatch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow(View),
    RedirectToLogin,
    RedirectToHome,
}

impl RouteDecision {
    /// Target path for redirects, `None` when allowed.
    pub fn redirect_path(self) -> Option<&'static str> {
        match self {
            Self::Allow(_) => None,
            Self::RedirectToLogin => Some(LOGIN_PATH),
            Self::RedirectToHome => Some(HOME_PATH),
        }
    }
}

pub const ROUTES: &[RouteRule] = &[
    RouteRule {
        path: LOGIN_PATH,
        view: View::Login,
        requirement: RouteRequirement::Public,
    },
    RouteRule {
        path: "/registro",
        view: View::Register,
        requirement: RouteRequirement::Public,
    },
    RouteRule {
        path: "/recuperar",
        view: View::ForgotPassword,
        requirement: RouteRequirement::Public,
    },
    RouteRule {
        path: "/restablecer",
        view: View::ResetPassword,
        requirement: RouteRequirement::Public,
    },
    RouteRule {
        path: HOME_PATH,
        view: View::Home,
        requirement: RouteRequirement::Authenticated,
    },
    RouteRule {
        path: "/inventario",
        view: View::Inventory,
        requirement: RouteRequirement::Capability(Capability::ViewInventory),
    },
    RouteRule {
        path: "/solicitudes",
        view: View::MyRequests,
        requirement: RouteRequirement::Capability(Capability::RequestLoans),
    },
    RouteRule {
        path: "/prestamos",
        view: View::Loans,
        requirement: RouteRequirement::Capability(Capability::ViewAllLoans),
    },
    RouteRule {
        path: "/devoluciones",
        view: View::Returns,
        requirement: RouteRequirement::Capability(Capability::ReceiveReturns),
    },
    RouteRule {
        path: "/estadisticas",
        view: View::Statistics,
        requirement: RouteRequirement::Capability(Capability::ViewStatistics),
    },
    RouteRule {
        path: "/importar",
        view: View::Import,
        requirement: RouteRequirement::Capability(Capability::InterchangeInventory),
    },
    RouteRule {
        path: "/usuarios",
        view: View::Users,
        requirement: RouteRequirement::Capability(Capability::ManageUsers),
    },
    RouteRule {
        path: "/perfil",
        view: View::Profile,
        requirement: RouteRequirement::Authenticated,
    },
];

/// Looks up the rule for `path`, ignoring query string and trailing slash.
pub fn find_route(path: &str) -> Option<&'static RouteRule> {
    let normalized = normalize_path(path);
    ROUTES.iter().find(|rule| rule.path == normalized)
}

/// Decides whether `session` may open `path`.
pub fn authorize(path: &str, session: Option<&Session>) -> RouteDecision {
    let decision = match (find_route(path), session) {
        (None, None) => RouteDecision::RedirectToLogin,
        (None, Some(_)) => RouteDecision::RedirectToHome,
        (Some(rule), None) => match rule.requirement {
            RouteRequirement::Public => RouteDecision::Allow(rule.view),
            _ => RouteDecision::RedirectToLogin,
        },
        (Some(rule), Some(session)) => match rule.requirement {
            RouteRequirement::Public if rule.view == View::Login => RouteDecision::RedirectToHome,
            RouteRequirement::Public | RouteRequirement::Authenticated => {
                RouteDecision::Allow(rule.view)
            }
            RouteRequirement::Capability(capability) if session.role.has(capability) => {
                RouteDecision::Allow(rule.view)
            }
            RouteRequirement::Capability(_) => RouteDecision::RedirectToHome,
        },
    };
    debug!(
        "event=route_authorize module=access path={} authenticated={} decision={:?}",
        normalize_path(path),
        session.is_some(),
        decision
    );
    decision
}

fn normalize_path(path: &str) -> &str {
    let without_query = path.split(['?', '#']).next().unwrap_or(path).trim();
    let trimmed = without_query.trim_end_matches('/');
    if trimmed.is_empty() {
        HOME_PATH
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::{authorize, find_route, normalize_path, RouteDecision, View};
    use crate::model::role::Role;
    use crate::model::user::Session;
    use uuid::Uuid;

    fn session(role: Role) -> Session {
        Session::new("token", Uuid::new_v4(), role, "Ana", 0)
    }

    #[test]
    fn normalize_strips_query_and_trailing_slash() {
        assert_eq!(normalize_path("/inventario/?page=2"), "/inventario");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert!(find_route("/usuarios#top").is_some());
    }

    #[test]
    fn anonymous_is_sent_to_login_except_public_routes() {
        assert_eq!(authorize("/prestamos", None), RouteDecision::RedirectToLogin);
        assert_eq!(authorize("/login", None), RouteDecision::Allow(View::Login));
        assert_eq!(authorize("/nope", None), RouteDecision::RedirectToLogin);
    }

    #[test]
    fn under_privileged_is_sent_home() {
        let user = session(Role::User);
        assert_eq!(
            authorize("/usuarios", Some(&user)),
            RouteDecision::RedirectToHome
        );
        assert_eq!(
            authorize("/inventario", Some(&user)),
            RouteDecision::Allow(View::Inventory)
        );
        assert_eq!(authorize("/login", Some(&user)), RouteDecision::RedirectToHome);
    }

    #[test]
    fn redirect_paths_match_decisions() {
        assert_eq!(RouteDecision::RedirectToLogin.redirect_path(), Some("/login"));
        assert_eq!(RouteDecision::RedirectToHome.redirect_path(), Some("/"));
        assert_eq!(RouteDecision::Allow(View::Home).redirect_path(), None);
    }
}
