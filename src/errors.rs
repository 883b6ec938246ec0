use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::authz::{DenyReason, ScopeMode};
use crate::models::{Action, ResourceType, Role};

/// Message shown to end users for every denial, whatever the reason.
pub const ACCESS_DENIED_MESSAGE: &str = "You do not have permission to perform this action";

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load-time failures. Any of these must stop the process from starting.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("unknown policy version: {0}")]
    UnknownPolicyVersion(String),
    #[error("policy document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("policy document declares version {found}, expected {expected}")]
    VersionMismatch { expected: String, found: String },
    #[error("role {0} has no entry in the policy")]
    MissingRole(Role),
    #[error("resource type {0} has no shape declaration")]
    MissingResourceShape(ResourceType),
    #[error("role {role} has no entry for {resource}")]
    MissingResource { role: Role, resource: ResourceType },
    #[error("role {role} has no {action} entry for {resource}")]
    MissingCapability {
        role: Role,
        resource: ResourceType,
        action: Action,
    },
    #[error("role {role} may {action} {resource} but admin may not")]
    NonMonotonic {
        role: Role,
        resource: ResourceType,
        action: Action,
    },
    #[error("role {role} reads {resource} more widely than admin")]
    NarrowerAdminScope { role: Role, resource: ResourceType },
    #[error(
        "roles disagree on {action} for {resource} and no intentional divergence is documented"
    )]
    UndocumentedDivergence {
        resource: ResourceType,
        action: Action,
    },
    #[error("intentional divergence for {action} on {resource} has an empty rationale")]
    EmptyRationale {
        resource: ResourceType,
        action: Action,
    },
    #[error("role {role} can read {resource} but declares no scope mode")]
    MissingScope { role: Role, resource: ResourceType },
    #[error("role {role} may {action} {resource} without being able to read it")]
    ScopedWithoutRead {
        role: Role,
        resource: ResourceType,
        action: Action,
    },
    #[error("role {role} uses {mode} on {resource}, which carries no {field}")]
    ScopeRequiresField {
        role: Role,
        resource: ResourceType,
        mode: ScopeMode,
        field: &'static str,
    },
    #[error("invalid value for {name}: {value}")]
    InvalidSetting { name: &'static str, value: String },
}

impl ConfigError {
    pub fn invalid_setting(name: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name,
            value: value.into(),
        }
    }
}

/// Delivery failures of an audit sink. They never change a decision.
#[derive(thiserror::Error, Debug)]
pub enum AuditError {
    #[error("audit sink io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
    #[error("audit chain broken at line {line}")]
    BrokenChain { line: usize },
}

impl AuditError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// A denied decision turned into a rejection, for callers that propagate
/// authorization with `?`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("You do not have permission to perform this action")]
pub struct AccessDenied {
    pub reason: DenyReason,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    reason: String,
}

impl IntoResponse for AccessDenied {
    fn into_response(self) -> Response {
        let payload = ErrorResponse {
            error: "forbidden".to_string(),
            message: ACCESS_DENIED_MESSAGE.to_string(),
            reason: self.reason.code().to_string(),
        };

        (StatusCode::FORBIDDEN, Json(payload)).into_response()
    }
}
