use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::registry::{Registry, ScopeMode};
use crate::models::{Action, Actor, ResourceInstance, ResourceType};

/// Declarative description of the instances an actor may read. The storage
/// layer translates it into its own query predicate; [`ScopeDescriptor::admits`]
/// is the reference semantics that predicate must match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ScopeDescriptor {
    All,
    OwnOnly { owner_id: String },
    DepartmentScoped { department_id: String },
    /// Enterprise-wide instances plus restricted ones the actor owns.
    EnterpriseWideOnly { owner_id: String },
    /// No instance at all.
    Nothing,
}

impl ScopeDescriptor {
    pub fn mode(&self) -> Option<ScopeMode> {
        match self {
            ScopeDescriptor::All => Some(ScopeMode::All),
            ScopeDescriptor::OwnOnly { .. } => Some(ScopeMode::OwnOnly),
            ScopeDescriptor::DepartmentScoped { .. } => Some(ScopeMode::DepartmentScoped),
            ScopeDescriptor::EnterpriseWideOnly { .. } => Some(ScopeMode::EnterpriseWideOnly),
            ScopeDescriptor::Nothing => None,
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, ScopeDescriptor::All)
    }

    pub fn admits(&self, instance: &ResourceInstance) -> bool {
        match self {
            ScopeDescriptor::All => true,
            ScopeDescriptor::OwnOnly { owner_id } => owned_by(instance, owner_id),
            ScopeDescriptor::DepartmentScoped { department_id } => {
                instance.department_id.as_deref() == Some(department_id.as_str())
            }
            ScopeDescriptor::EnterpriseWideOnly { owner_id } => {
                instance.is_enterprise_wide() || owned_by(instance, owner_id)
            }
            ScopeDescriptor::Nothing => false,
        }
    }
}

fn owned_by(instance: &ResourceInstance, owner_id: &str) -> bool {
    !owner_id.is_empty() && instance.owner_id.as_deref() == Some(owner_id)
}

/// Turns `(actor, resource type)` into a [`ScopeDescriptor`] using only the
/// modes the registry declares for the actor's role.
#[derive(Debug, Clone)]
pub struct ScopeResolver {
    registry: Arc<Registry>,
}

impl ScopeResolver {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// The widest descriptor the actor satisfies. This is what list queries
    /// filter on.
    pub fn resolve(&self, actor: &Actor, resource: ResourceType) -> ScopeDescriptor {
        let descriptor = self
            .applicable(actor, resource)
            .into_iter()
            .next()
            .unwrap_or(ScopeDescriptor::Nothing);

        tracing::trace!(
            actor_id = %actor.id,
            role = %actor.role,
            resource = %resource,
            scope = ?descriptor,
            "scope resolved"
        );
        descriptor
    }

    /// Every declared mode the actor satisfies, widest first. Empty when the
    /// role cannot read the resource type.
    pub fn applicable(&self, actor: &Actor, resource: ResourceType) -> Vec<ScopeDescriptor> {
        let caps = self.registry.capabilities_for(actor.role);
        if !caps.allows(resource, Action::Read) {
            return Vec::new();
        }

        caps.scope_modes(resource)
            .iter()
            .filter_map(|mode| descriptor_for(*mode, actor))
            .collect()
    }

    /// The widest applicable descriptor that admits `instance`, if any.
    pub fn admitting(
        &self,
        actor: &Actor,
        resource: ResourceType,
        instance: &ResourceInstance,
    ) -> Option<ScopeDescriptor> {
        self.applicable(actor, resource)
            .into_iter()
            .find(|descriptor| descriptor.admits(instance))
    }
}

fn descriptor_for(mode: ScopeMode, actor: &Actor) -> Option<ScopeDescriptor> {
    match mode {
        ScopeMode::All => Some(ScopeDescriptor::All),
        ScopeMode::DepartmentScoped => actor
            .department_id
            .as_ref()
            .filter(|department_id| !department_id.is_empty())
            .map(|department_id| ScopeDescriptor::DepartmentScoped {
                department_id: department_id.clone(),
            }),
        ScopeMode::EnterpriseWideOnly => Some(ScopeDescriptor::EnterpriseWideOnly {
            owner_id: actor.id.clone(),
        }),
        ScopeMode::OwnOnly => (!actor.id.is_empty()).then(|| ScopeDescriptor::OwnOnly {
            owner_id: actor.id.clone(),
        }),
    }
}
