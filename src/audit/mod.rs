use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::{Decision, DenyReason};
use crate::models::{Action, Actor, ResourceInstance, ResourceType, Role};

pub mod emitter;
pub mod sink;

pub use emitter::{AuditConfig, AuditEmitter, AuditHandle, AuditSnapshot, MAX_CAPACITY};
pub use sink::{verify_chain, AuditSink, LogSink, MemorySink, NdjsonFileSink, SinkTarget};

/// Severity levels for audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Likely caller bugs and role changes
    Critical,
    /// Ordinary denials and privileged allows
    Important,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Denied,
    PrivilegedAllow,
    RoleAssignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Allow,
    Deny,
}

/// One line of the audit stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub event: AuditEvent,
    pub actor_id: String,
    pub actor_role: Role,
    pub action: Action,
    pub resource_type: ResourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub decision: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<DenyReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_role: Option<Role>,
    pub severity: Severity,
    pub policy_version: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        event: AuditEvent,
        actor: &Actor,
        action: Action,
        resource_type: ResourceType,
        instance: Option<&ResourceInstance>,
        decision: Decision,
        policy_version: &str,
    ) -> Self {
        let (outcome, reason_code) = match decision {
            Decision::Allow => (Outcome::Allow, None),
            Decision::Deny(reason) => (Outcome::Deny, Some(reason)),
        };

        Self {
            id: Uuid::new_v4(),
            event,
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            action,
            resource_type,
            resource_id: instance.map(|instance| instance.id.clone()),
            decision: outcome,
            reason_code,
            new_role: None,
            severity: severity_for(event, reason_code),
            policy_version: policy_version.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_new_role(mut self, role: Role) -> Self {
        self.new_role = Some(role);
        self
    }
}

fn severity_for(event: AuditEvent, reason: Option<DenyReason>) -> Severity {
    match (event, reason) {
        (_, Some(DenyReason::MissingInstanceContext)) => Severity::Critical,
        (AuditEvent::RoleAssignment, _) => Severity::Critical,
        _ => Severity::Important,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_context_is_critical() {
        let actor = Actor::new("u1", Role::Employee, "org-1");
        let record = AuditRecord::new(
            AuditEvent::Denied,
            &actor,
            Action::Update,
            ResourceType::Project,
            None,
            Decision::Deny(DenyReason::MissingInstanceContext),
            "v1",
        );
        assert_eq!(record.severity, Severity::Critical);
        assert_eq!(record.decision, Outcome::Deny);
        assert_eq!(record.resource_id, None);
    }

    #[test]
    fn record_serializes_flat_snake_case() {
        let actor = Actor::new("u1", Role::Manager, "org-1");
        let instance = ResourceInstance::new("t9");
        let record = AuditRecord::new(
            AuditEvent::Denied,
            &actor,
            Action::Delete,
            ResourceType::TimeEntry,
            Some(&instance),
            Decision::Deny(DenyReason::RoleLacksCapability),
            "v1",
        );
        let value = serde_json::to_value(&record).expect("serialize");

        assert_eq!(value["actor_id"], "u1");
        assert_eq!(value["actor_role"], "manager");
        assert_eq!(value["resource_type"], "time_entry");
        assert_eq!(value["resource_id"], "t9");
        assert_eq!(value["decision"], "deny");
        assert_eq!(value["reason_code"], "role_lacks_capability");
        assert_eq!(value["severity"], "important");
        assert!(value.get("new_role").is_none());
    }
}
