//! Roles and authentication persistence modes.

use serde::{Deserialize, Serialize};

/// Role granted to a portal account.
///
/// Every registered account gets [`Role::User`]. Roles are trusted at face
/// value by consumers; nothing here enforces policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular member.
    User,
    /// May grant publishing rights to other members.
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}

/// How long an authentication session survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    /// Survives process restarts.
    #[default]
    Local,
    /// Lasts as long as the running client.
    Session,
    /// Kept in memory only; cleared on reload.
    None,
}

impl std::fmt::Display for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Session => write!(f, "session"),
            Self::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for Persistence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "session" => Ok(Self::Session),
            "none" => Ok(Self::None),
            _ => Err(format!("invalid persistence mode: {s}")),
        }
    }
}

impl Persistence {
    /// Whether a session in this mode survives a process restart.
    #[must_use]
    pub const fn survives_restart(self) -> bool {
        matches!(self, Self::Local)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_display() {
        for role in [Role::User, Role::Admin] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_persistence_default_is_local() {
        assert_eq!(Persistence::default(), Persistence::Local);
        assert!(Persistence::Local.survives_restart());
        assert!(!Persistence::Session.survives_restart());
    }

    #[test]
    fn test_persistence_parse() {
        assert_eq!("session".parse::<Persistence>().unwrap(), Persistence::Session);
        assert!("forever".parse::<Persistence>().is_err());
    }
}
