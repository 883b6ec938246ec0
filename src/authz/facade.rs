use std::sync::Arc;

use super::decision::{Decision, DenyReason};
use super::evaluator::{Evaluation, PolicyEvaluator};
use super::registry::{Registry, ScopeMode};
use super::scope::ScopeDescriptor;
use crate::audit::{AuditEvent, AuditHandle, AuditRecord};
use crate::errors::ConfigResult;
use crate::models::{Action, Actor, ResourceInstance, ResourceType, Role};

/// The question every caller asks: route guards, page guards and navigation
/// rendering all go through this and nothing else.
pub trait Authorize {
    fn can(
        &self,
        actor: &Actor,
        action: Action,
        resource: ResourceType,
        instance: Option<&ResourceInstance>,
    ) -> Decision;

    fn scope_for(&self, actor: &Actor, resource: ResourceType) -> ScopeDescriptor;
}

/// The single [`Authorize`] implementation. Clones share the same registry
/// and audit handle.
#[derive(Debug, Clone)]
pub struct Authorizer {
    registry: Arc<Registry>,
    evaluator: PolicyEvaluator,
    audit: Option<AuditHandle>,
}

impl Authorizer {
    pub fn new(registry: Registry) -> Self {
        let registry = Arc::new(registry);
        Self {
            evaluator: PolicyEvaluator::new(Arc::clone(&registry)),
            registry,
            audit: None,
        }
    }

    /// Loads and validates the embedded policy for `version`.
    pub fn load(version: &str) -> ConfigResult<Self> {
        Ok(Self::new(Registry::load(version)?))
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Gate for changing an employee's role. The actor must be allowed to
    /// update the target employee record, and the new role may not hold any
    /// capability the actor lacks.
    pub fn authorize_role_assignment(
        &self,
        actor: &Actor,
        target: &ResourceInstance,
        new_role: Role,
    ) -> Decision {
        let decision = match self
            .evaluator
            .evaluate(actor, Action::Update, ResourceType::Employee, Some(target))
        {
            Decision::Allow => {
                let granted = self.registry.capabilities_for(new_role);
                let held = self.registry.capabilities_for(actor.role);
                if granted.is_subset_of(held) {
                    Decision::Allow
                } else {
                    tracing::info!(
                        actor_id = %actor.id,
                        role = %actor.role,
                        new_role = %new_role,
                        "role assignment would escalate privileges"
                    );
                    Decision::Deny(DenyReason::PrivilegeEscalation)
                }
            }
            deny => deny,
        };

        if let Some(audit) = &self.audit {
            audit.emit(
                AuditRecord::new(
                    AuditEvent::RoleAssignment,
                    actor,
                    Action::Update,
                    ResourceType::Employee,
                    Some(target),
                    decision,
                    self.registry.version(),
                )
                .with_new_role(new_role),
            );
        }

        decision
    }

    fn record(
        &self,
        actor: &Actor,
        action: Action,
        resource: ResourceType,
        instance: Option<&ResourceInstance>,
        evaluation: &Evaluation,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };

        let event = match evaluation.decision {
            Decision::Deny(_) => AuditEvent::Denied,
            Decision::Allow if is_privileged(action, evaluation.scope.as_ref()) => {
                AuditEvent::PrivilegedAllow
            }
            Decision::Allow => return,
        };

        audit.emit(AuditRecord::new(
            event,
            actor,
            action,
            resource,
            instance,
            evaluation.decision,
            self.registry.version(),
        ));
    }
}

/// A mutating allow is privileged when the actor's authority came from a
/// scope wider than their own records.
fn is_privileged(action: Action, scope: Option<&ScopeDescriptor>) -> bool {
    let width = scope
        .and_then(ScopeDescriptor::mode)
        .map(|mode| mode.width())
        .unwrap_or(0);
    action.is_mutating() && width > ScopeMode::OwnOnly.width()
}

impl Authorize for Authorizer {
    fn can(
        &self,
        actor: &Actor,
        action: Action,
        resource: ResourceType,
        instance: Option<&ResourceInstance>,
    ) -> Decision {
        let evaluation = self
            .evaluator
            .evaluate_detailed(actor, action, resource, instance);
        self.record(actor, action, resource, instance, &evaluation);
        evaluation.decision
    }

    fn scope_for(&self, actor: &Actor, resource: ResourceType) -> ScopeDescriptor {
        self.evaluator.resolver().resolve(actor, resource)
    }
}
