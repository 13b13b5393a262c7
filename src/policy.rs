/*!
Role-to-route policy.

This is the only place that knows which role may see which page. The
request gate ([`decide`]) and the navigation menu ([`nav_items`]) both
read it, so the two can't disagree.
*/
use serde::Serialize;

use crate::user::{Role, SessionUser};

pub const ROOT_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";
pub const LOGOUT_PATH: &str = "/logout";
/// Where the restricted role lands instead of the dashboard.
pub const SIMPLE_LANDING: &str = "/formateurs";

/// Reachable without a session.
static PUBLIC_PATHS: &[&str] = &[LOGIN_PATH, LOGOUT_PATH];

/// Never gated at all.
static EXEMPT_PATHS: &[&str] = &["/static", "/favicon.ico"];

static SIMPLE_PREFIXES: &[&str] = &["/formateurs", "/participants", "/formations"];

/// What a role may reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Allow {
    Everything,
    Exactly(&'static str),
    Prefixes(&'static [&'static str]),
}

/// True if `path` is `prefix` or lies beneath it.
fn under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl Allow {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Allow::Everything => true,
            Allow::Exactly(p) => path == *p,
            Allow::Prefixes(prefixes) => prefixes.iter().any(|p| under(path, p)),
        }
    }
}

impl Role {
    pub fn allowance(&self) -> Allow {
        match self {
            Role::Admin => Allow::Everything,
            Role::Responsable => Allow::Exactly(ROOT_PATH),
            Role::Simple => Allow::Prefixes(SIMPLE_PREFIXES),
        }
    }

    pub fn permits(&self, path: &str) -> bool {
        self.allowance().matches(path)
    }
}

/// Landing page after login, or after being turned away.
pub fn landing(role: Option<Role>) -> &'static str {
    match role {
        Some(Role::Simple) => SIMPLE_LANDING,
        _ => ROOT_PATH,
    }
}

pub fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.iter().any(|p| under(path, p))
}

pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|p| under(path, p))
}

/// Outcome of gating one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    Redirect(&'static str),
}

/**
Decide whether a request for `path` may be served.

`session` is the resolved session, if the request carried a valid one.
The decision depends on nothing else.
*/
pub fn decide(path: &str, session: Option<&SessionUser>) -> Verdict {
    log::trace!("policy::decide( {:?}, {:?} ) called.", path, &session);

    if is_exempt(path) {
        return Verdict::Proceed;
    }

    if path == LOGIN_PATH {
        if let Some(s) = session {
            return Verdict::Redirect(landing(s.role()));
        }
    }

    if is_public(path) {
        return Verdict::Proceed;
    }

    let s = match session {
        Some(s) => s,
        None => { return Verdict::Redirect(LOGIN_PATH); },
    };

    if s.role_name().is_none() {
        if path == ROOT_PATH {
            return Verdict::Proceed;
        }
        return Verdict::Redirect(ROOT_PATH);
    }

    // A role label we don't recognize gets an empty allow-list.
    let role = s.role();

    if role == Some(Role::Simple) && path == ROOT_PATH {
        return Verdict::Redirect(SIMPLE_LANDING);
    }

    if path != ROOT_PATH {
        let allowed = match role {
            Some(r) => r.permits(path),
            None => false,
        };
        if !allowed {
            return Verdict::Redirect(landing(role));
        }
    }

    Verdict::Proceed
}

/// One entry of the navigation menu.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub label: &'static str,
    pub href: &'static str,
}

pub static NAV_ITEMS: &[NavItem] = &[
    NavItem { label: "Dashboard",    href: "/" },
    NavItem { label: "Formateurs",   href: "/formateurs" },
    NavItem { label: "Participants", href: "/participants" },
    NavItem { label: "Formations",   href: "/formations" },
    NavItem { label: "Domaines",     href: "/domaines" },
    NavItem { label: "Structures",   href: "/structures" },
    NavItem { label: "Employeurs",   href: "/employeurs" },
    NavItem { label: "Profils",      href: "/profils" },
    NavItem { label: "Utilisateurs", href: "/utilisateurs" },
    NavItem { label: "Roles",        href: "/roles" },
];

/**
Menu entries shown to a user with role label `role_name`.

This is a convenience for rendering, not a security boundary: an absent
or unrecognized role sees every entry, and the gate still decides what
actually gets served.
*/
pub fn nav_items(role_name: Option<&str>) -> Vec<&'static NavItem> {
    let role = match role_name.and_then(Role::from_name) {
        Some(r) => r,
        None => { return NAV_ITEMS.iter().collect(); },
    };

    NAV_ITEMS.iter()
        .filter(|item| role.permits(item.href))
        .collect()
}
