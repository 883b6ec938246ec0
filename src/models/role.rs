use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ParseEnumError;

/// Closed set of roles an actor can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    ProjectManager,
    Manager,
    Employee,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::ProjectManager,
        Role::Manager,
        Role::Employee,
        Role::Viewer,
    ];

    /// Role given to actors whose role claim is missing or unrecognised.
    pub const LEAST_PRIVILEGED: Role = Role::Employee;

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::ProjectManager => "project_manager",
            Role::Manager => "manager",
            Role::Employee => "employee",
            Role::Viewer => "viewer",
        }
    }

    /// Position in [`Role::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Role::Admin => 0,
            Role::ProjectManager => 1,
            Role::Manager => 2,
            Role::Employee => 3,
            Role::Viewer => 4,
        }
    }

    /// Maps a role claim handed over by the identity provider onto the closed
    /// role set. A missing or unrecognised claim yields [`Role::LEAST_PRIVILEGED`],
    /// never `Admin`.
    pub fn from_claim(claim: Option<&str>) -> Role {
        let Some(raw) = claim else {
            tracing::warn!(fallback = %Role::LEAST_PRIVILEGED, "actor has no role claim");
            return Role::LEAST_PRIVILEGED;
        };

        match raw.parse::<Role>() {
            Ok(role) => role,
            Err(_) => {
                tracing::warn!(
                    claim = %raw,
                    fallback = %Role::LEAST_PRIVILEGED,
                    "unmapped role claim"
                );
                Role::LEAST_PRIVILEGED
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "admin" => Ok(Role::Admin),
            "project_manager" | "projectmanager" => Ok(Role::ProjectManager),
            "manager" => Ok(Role::Manager),
            "employee" => Ok(Role::Employee),
            "viewer" => Ok(Role::Viewer),
            _ => Err(ParseEnumError::new("role", s)),
        }
    }
}
