//! Role & permission registry.
//!
//! The capability table is compiled into the binary as one JSON document per
//! policy version. It is parsed and validated once at boot; a document that
//! fails validation stops the process. After construction the registry is
//! immutable and shared by reference.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, ConfigResult};
use crate::models::{Action, ResourceType, Role};

pub const DEFAULT_POLICY_VERSION: &str = "v1";

const EMBEDDED_POLICIES: &[(&str, &str)] = &[(
    "v1",
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/policies/v1.json")),
)];

/// Policy versions compiled into this build.
pub fn embedded_versions() -> impl Iterator<Item = &'static str> {
    EMBEDDED_POLICIES.iter().map(|(version, _)| *version)
}

/// Raw source of an embedded policy document.
pub fn embedded_source(version: &str) -> Option<&'static str> {
    EMBEDDED_POLICIES
        .iter()
        .find(|(candidate, _)| *candidate == version)
        .map(|(_, source)| *source)
}

/// How much of a resource type a role may see. Ordered by [`ScopeMode::width`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    All,
    DepartmentScoped,
    EnterpriseWideOnly,
    OwnOnly,
}

impl ScopeMode {
    /// Tie-break rank between modes declared for the same resource; wider wins.
    pub fn width(&self) -> u8 {
        match self {
            ScopeMode::All => 3,
            ScopeMode::DepartmentScoped => 2,
            ScopeMode::EnterpriseWideOnly => 1,
            ScopeMode::OwnOnly => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeMode::All => "all",
            ScopeMode::DepartmentScoped => "department_scoped",
            ScopeMode::EnterpriseWideOnly => "enterprise_wide_only",
            ScopeMode::OwnOnly => "own_only",
        }
    }

    /// Name of the instance field this mode filters on that `shape` lacks.
    fn missing_field(&self, shape: ResourceShape) -> Option<&'static str> {
        match self {
            ScopeMode::All => None,
            ScopeMode::OwnOnly if !shape.owner => Some("owner_id"),
            ScopeMode::DepartmentScoped if !shape.department => Some("department_id"),
            ScopeMode::EnterpriseWideOnly if !shape.enterprise_flag => Some("is_enterprise_wide"),
            ScopeMode::EnterpriseWideOnly if !shape.owner => Some("owner_id"),
            _ => None,
        }
    }
}

impl fmt::Display for ScopeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the optional [`ResourceInstance`](crate::models::ResourceInstance)
/// fields the storage layer fills in for a resource type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceShape {
    #[serde(default)]
    pub owner: bool,
    #[serde(default)]
    pub department: bool,
    #[serde(default)]
    pub enterprise_flag: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceGrant {
    #[serde(default)]
    pub actions: BTreeMap<Action, bool>,
    #[serde(default)]
    pub scope: Vec<ScopeMode>,
}

/// A documented, deliberate disagreement between roles on a sensitive action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Divergence {
    pub resource: ResourceType,
    pub action: Action,
    pub rationale: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    pub version: String,
    pub resources: BTreeMap<ResourceType, ResourceShape>,
    pub roles: BTreeMap<Role, BTreeMap<ResourceType, ResourceGrant>>,
    #[serde(default)]
    pub intentional_divergences: Vec<Divergence>,
}

/// Everything one role may do, resolved and complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    role: Role,
    grants: BTreeMap<(ResourceType, Action), bool>,
    scopes: BTreeMap<ResourceType, Vec<ScopeMode>>,
}

impl CapabilitySet {
    pub fn role(&self) -> Role {
        self.role
    }

    /// Missing entries deny.
    pub fn allows(&self, resource: ResourceType, action: Action) -> bool {
        self.grants.get(&(resource, action)).copied().unwrap_or(false)
    }

    /// Declared read scopes, widest first.
    pub fn scope_modes(&self, resource: ResourceType) -> &[ScopeMode] {
        self.scopes.get(&resource).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn widest_scope(&self, resource: ResourceType) -> Option<ScopeMode> {
        self.scope_modes(resource).first().copied()
    }

    pub fn granted(&self) -> impl Iterator<Item = (ResourceType, Action)> + '_ {
        self.grants
            .iter()
            .filter(|(_, allowed)| **allowed)
            .map(|(key, _)| *key)
    }

    pub fn is_subset_of(&self, other: &CapabilitySet) -> bool {
        self.granted()
            .all(|(resource, action)| other.allows(resource, action))
    }
}

#[derive(Debug)]
pub struct Registry {
    version: String,
    shapes: BTreeMap<ResourceType, ResourceShape>,
    capabilities: Vec<CapabilitySet>,
    divergences: Vec<Divergence>,
}

impl Registry {
    /// Loads and validates the embedded policy selected by `version`.
    pub fn load(version: &str) -> ConfigResult<Self> {
        let source = embedded_source(version)
            .ok_or_else(|| ConfigError::UnknownPolicyVersion(version.to_string()))?;
        Self::from_json(version, source)
    }

    pub fn from_json(expected_version: &str, source: &str) -> ConfigResult<Self> {
        let document: PolicyDocument = serde_json::from_str(source)?;
        if document.version != expected_version {
            return Err(ConfigError::VersionMismatch {
                expected: expected_version.to_string(),
                found: document.version,
            });
        }
        Self::from_document(document)
    }

    pub fn from_document(document: PolicyDocument) -> ConfigResult<Self> {
        let PolicyDocument {
            version,
            resources,
            mut roles,
            intentional_divergences,
        } = document;

        for resource in ResourceType::ALL {
            if !resources.contains_key(&resource) {
                return Err(ConfigError::MissingResourceShape(resource));
            }
        }

        let mut capabilities = Vec::with_capacity(Role::ALL.len());
        for role in Role::ALL {
            let grants = roles.remove(&role).ok_or(ConfigError::MissingRole(role))?;
            capabilities.push(build_capability_set(role, grants, &resources)?);
        }

        let registry = Self {
            version,
            shapes: resources,
            capabilities,
            divergences: intentional_divergences,
        };
        registry.check_monotonic()?;
        registry.check_divergences()?;

        tracing::info!(
            version = %registry.version,
            roles = registry.capabilities.len(),
            "policy registry loaded"
        );
        Ok(registry)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn capabilities_for(&self, role: Role) -> &CapabilitySet {
        &self.capabilities[role.index()]
    }

    pub fn scope_modes_for(&self, role: Role, resource: ResourceType) -> &[ScopeMode] {
        self.capabilities_for(role).scope_modes(resource)
    }

    pub fn shape(&self, resource: ResourceType) -> ResourceShape {
        self.shapes.get(&resource).copied().unwrap_or_default()
    }

    pub fn divergences(&self) -> &[Divergence] {
        &self.divergences
    }

    /// Admin must hold every capability any other role holds, and read every
    /// resource type at least as widely.
    fn check_monotonic(&self) -> ConfigResult<()> {
        let admin = self.capabilities_for(Role::Admin);

        for role in Role::ALL.into_iter().filter(|role| *role != Role::Admin) {
            let caps = self.capabilities_for(role);

            if let Some((resource, action)) = caps
                .granted()
                .find(|(resource, action)| !admin.allows(*resource, *action))
            {
                return Err(ConfigError::NonMonotonic {
                    role,
                    resource,
                    action,
                });
            }

            for resource in ResourceType::ALL {
                let theirs = caps.widest_scope(resource).map(|mode| mode.width());
                let admins = admin.widest_scope(resource).map(|mode| mode.width());
                if theirs > admins {
                    return Err(ConfigError::NarrowerAdminScope { role, resource });
                }
            }
        }

        Ok(())
    }

    fn check_divergences(&self) -> ConfigResult<()> {
        if let Some(divergence) = self
            .divergences
            .iter()
            .find(|divergence| divergence.rationale.trim().is_empty())
        {
            return Err(ConfigError::EmptyRationale {
                resource: divergence.resource,
                action: divergence.action,
            });
        }

        for resource in [ResourceType::Organization, ResourceType::Department] {
            let outcomes: BTreeSet<bool> = Role::ALL
                .into_iter()
                .map(|role| self.capabilities_for(role).allows(resource, Action::Delete))
                .collect();

            let documented = self
                .divergences
                .iter()
                .any(|divergence| {
                    divergence.resource == resource && divergence.action == Action::Delete
                });

            if outcomes.len() > 1 && !documented {
                return Err(ConfigError::UndocumentedDivergence {
                    resource,
                    action: Action::Delete,
                });
            }
        }

        Ok(())
    }
}

fn build_capability_set(
    role: Role,
    mut per_resource: BTreeMap<ResourceType, ResourceGrant>,
    shapes: &BTreeMap<ResourceType, ResourceShape>,
) -> ConfigResult<CapabilitySet> {
    let mut grants = BTreeMap::new();
    let mut scopes = BTreeMap::new();

    for resource in ResourceType::ALL {
        let grant = per_resource
            .remove(&resource)
            .ok_or(ConfigError::MissingResource { role, resource })?;
        let shape = shapes
            .get(&resource)
            .copied()
            .ok_or(ConfigError::MissingResourceShape(resource))?;

        for action in Action::ALL {
            let allowed = grant
                .actions
                .get(&action)
                .copied()
                .ok_or(ConfigError::MissingCapability {
                    role,
                    resource,
                    action,
                })?;
            grants.insert((resource, action), allowed);
        }

        for mode in &grant.scope {
            if let Some(field) = mode.missing_field(shape) {
                return Err(ConfigError::ScopeRequiresField {
                    role,
                    resource,
                    mode: *mode,
                    field,
                });
            }
        }

        let can_read = grants.get(&(resource, Action::Read)).copied().unwrap_or(false);
        if can_read && grant.scope.is_empty() {
            return Err(ConfigError::MissingScope { role, resource });
        }
        // Scoped writes are checked against the read scope, so they need one.
        if let Some(action) = Action::ALL.into_iter().find(|action| {
            action.is_instance_scoped()
                && !can_read
                && grants.get(&(resource, *action)).copied().unwrap_or(false)
        }) {
            return Err(ConfigError::ScopedWithoutRead {
                role,
                resource,
                action,
            });
        }

        let mut modes = grant.scope;
        modes.sort_by_key(|mode| Reverse(mode.width()));
        modes.dedup();
        scopes.insert(resource, modes);
    }

    Ok(CapabilitySet {
        role,
        grants,
        scopes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_default_policy_loads() {
        let registry = Registry::load(DEFAULT_POLICY_VERSION).expect("v1 must validate");
        assert_eq!(registry.version(), "v1");
        assert_eq!(registry.divergences().len(), 2);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = Registry::load("v0").expect_err("v0 is not embedded");
        assert!(matches!(err, ConfigError::UnknownPolicyVersion(v) if v == "v0"));
    }

    #[test]
    fn scope_modes_are_stored_widest_first() {
        let registry = Registry::load(DEFAULT_POLICY_VERSION).expect("v1");
        assert_eq!(
            registry.scope_modes_for(Role::Manager, ResourceType::TimeEntry),
            &[ScopeMode::DepartmentScoped, ScopeMode::OwnOnly]
        );
    }

    #[test]
    fn enterprise_scope_needs_owner_and_flag() {
        let only_flag = ResourceShape {
            enterprise_flag: true,
            ..ResourceShape::default()
        };
        assert_eq!(
            ScopeMode::EnterpriseWideOnly.missing_field(only_flag),
            Some("owner_id")
        );
        assert_eq!(ScopeMode::All.missing_field(ResourceShape::default()), None);
    }

    #[test]
    fn every_role_is_a_subset_of_admin() {
        let registry = Registry::load(DEFAULT_POLICY_VERSION).expect("v1");
        let admin = registry.capabilities_for(Role::Admin);
        for role in Role::ALL {
            assert!(registry.capabilities_for(role).is_subset_of(admin), "{role}");
        }
        assert!(!admin.is_subset_of(registry.capabilities_for(Role::Viewer)));
    }
}
