/*!
Console users and their access levels.
*/
use serde::Serialize;

/// Access level carried by a login account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Responsable,
    Simple,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Responsable, Role::Simple];

    /**
    Resolve a role label as the backend or a session reports it.

    Matching is case-insensitive and ignores surrounding whitespace; the
    long-form backend labels (`administrateur`, `simple utilisateur`) are
    accepted alongside the short ones. Anything else is `None`.
    */
    pub fn from_name(name: &str) -> Option<Role> {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "admin" | "administrateur" => Some(Role::Admin),
            "responsable" => Some(Role::Responsable),
            "simple" | "simple utilisateur" => Some(Role::Simple),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin       => "admin",
            Role::Responsable => "responsable",
            Role::Simple      => "simple",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::from_name(s)
            .ok_or_else(|| format!("{:?} is not a valid Role.", s))
    }
}

/// The identity attached to a live session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionUser {
    pub user_id: String,
    /// Role label as reported at login; empty or absent means no role.
    pub role: Option<String>,
    pub user_name: String,
}

impl SessionUser {
    /// Session granted by the development bypass login.
    pub fn development() -> SessionUser {
        SessionUser {
            user_id: "test-user-id".to_owned(),
            role: Some("admin".to_owned()),
            user_name: "admin".to_owned(),
        }
    }

    /// The role label, if one was reported and it isn't blank.
    pub fn role_name(&self) -> Option<&str> {
        match self.role.as_deref() {
            Some(r) if !r.trim().is_empty() => Some(r),
            _ => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.role_name().and_then(Role::from_name)
    }
}
