use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::AccessDenied;

/// Machine-readable reason attached to every denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    RoleLacksCapability,
    OutOfScope,
    MissingInstanceContext,
    PrivilegeEscalation,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::RoleLacksCapability => "role_lacks_capability",
            DenyReason::OutOfScope => "out_of_scope",
            DenyReason::MissingInstanceContext => "missing_instance_context",
            DenyReason::PrivilegeEscalation => "privilege_escalation",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of an authorization check. Plain data: there is nothing to call
/// and nothing that is implicitly truthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn deny(reason: DenyReason) -> Self {
        Decision::Deny(reason)
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allow => None,
            Decision::Deny(reason) => Some(*reason),
        }
    }

    /// Lets route handlers write `authorizer.can(..).into_result()?`.
    pub fn into_result(self) -> Result<(), AccessDenied> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(AccessDenied { reason }),
        }
    }
}
