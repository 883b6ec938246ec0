use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::resource::ResourceInstance;
use super::role::Role;

/// The authenticated principal behind a request, as handed over by the
/// identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    #[serde(default = "least_privileged", deserialize_with = "role_or_least_privileged")]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    pub organization_id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role, organization_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            department_id: None,
            organization_id: organization_id.into(),
        }
    }

    /// Builds an actor from a raw role claim; see [`Role::from_claim`].
    pub fn from_identity(
        id: impl Into<String>,
        role_claim: Option<&str>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self::new(id, Role::from_claim(role_claim), organization_id)
    }

    pub fn with_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    pub fn owns(&self, instance: &ResourceInstance) -> bool {
        !self.id.is_empty() && instance.owner_id.as_deref() == Some(self.id.as_str())
    }

    pub fn shares_department_with(&self, instance: &ResourceInstance) -> bool {
        match (&self.department_id, &instance.department_id) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        }
    }
}

fn least_privileged() -> Role {
    Role::LEAST_PRIVILEGED
}

fn role_or_least_privileged<'de, D>(deserializer: D) -> Result<Role, D::Error>
where
    D: Deserializer<'de>,
{
    let claim: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match claim {
        Some(Value::String(raw)) => Role::from_claim(Some(&raw)),
        None | Some(Value::Null) => Role::from_claim(None),
        Some(other) => {
            tracing::warn!(
                claim = %other,
                fallback = %Role::LEAST_PRIVILEGED,
                "unmapped role claim"
            );
            Role::LEAST_PRIVILEGED
        }
    })
}
