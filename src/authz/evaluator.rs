use std::sync::Arc;

use super::decision::{Decision, DenyReason};
use super::registry::Registry;
use super::scope::{ScopeDescriptor, ScopeResolver};
use crate::models::{Action, Actor, ResourceInstance, ResourceType};

/// A decision together with the scope that backed it, when one was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    pub scope: Option<ScopeDescriptor>,
}

impl Evaluation {
    fn deny(reason: DenyReason, scope: Option<ScopeDescriptor>) -> Self {
        Self {
            decision: Decision::Deny(reason),
            scope,
        }
    }
}

/// Pure decision function over the registry.
///
/// Evaluation order:
/// 1. instance-scoped action without an instance -> deny `missing_instance_context`
/// 2. capability absent or false for the role -> deny `role_lacks_capability`
/// 3. instance given and admitted by none of the actor's applicable scopes -> deny `out_of_scope`
/// 4. allow
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    registry: Arc<Registry>,
    resolver: ScopeResolver,
}

impl PolicyEvaluator {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            resolver: ScopeResolver::new(Arc::clone(&registry)),
            registry,
        }
    }

    pub fn resolver(&self) -> &ScopeResolver {
        &self.resolver
    }

    pub fn evaluate(
        &self,
        actor: &Actor,
        action: Action,
        resource: ResourceType,
        instance: Option<&ResourceInstance>,
    ) -> Decision {
        self.evaluate_detailed(actor, action, resource, instance).decision
    }

    pub fn evaluate_detailed(
        &self,
        actor: &Actor,
        action: Action,
        resource: ResourceType,
        instance: Option<&ResourceInstance>,
    ) -> Evaluation {
        // 1. A malformed guard is a caller bug, whatever the role.
        if action.is_instance_scoped() && instance.is_none() {
            tracing::warn!(
                actor_id = %actor.id,
                role = %actor.role,
                action = %action,
                resource = %resource,
                "scoped action checked without instance context"
            );
            return Evaluation::deny(DenyReason::MissingInstanceContext, None);
        }

        // 2. Capability table
        if !self.registry.capabilities_for(actor.role).allows(resource, action) {
            tracing::debug!(
                actor_id = %actor.id,
                role = %actor.role,
                action = %action,
                resource = %resource,
                "role lacks capability"
            );
            return Evaluation::deny(DenyReason::RoleLacksCapability, None);
        }

        // 3. Scope: any declared mode the actor satisfies may admit the instance
        let scope = match instance {
            Some(instance) => match self.resolver.admitting(actor, resource, instance) {
                Some(scope) => scope,
                None => {
                    let widest = self.resolver.resolve(actor, resource);
                    tracing::debug!(
                        actor_id = %actor.id,
                        role = %actor.role,
                        action = %action,
                        resource = %resource,
                        instance_id = %instance.id,
                        scope = ?widest,
                        "instance outside scope"
                    );
                    return Evaluation::deny(DenyReason::OutOfScope, Some(widest));
                }
            },
            None => self.resolver.resolve(actor, resource),
        };

        // 4. Allow
        tracing::debug!(
            actor_id = %actor.id,
            role = %actor.role,
            action = %action,
            resource = %resource,
            scope = ?scope,
            "permission granted"
        );
        Evaluation {
            decision: Decision::Allow,
            scope: Some(scope),
        }
    }
}
