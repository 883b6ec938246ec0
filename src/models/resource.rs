use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Project,
    Task,
    TimeEntry,
    Employee,
    Department,
    Organization,
}

impl ResourceType {
    pub const ALL: [ResourceType; 6] = [
        ResourceType::Project,
        ResourceType::Task,
        ResourceType::TimeEntry,
        ResourceType::Employee,
        ResourceType::Department,
        ResourceType::Organization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Project => "project",
            ResourceType::Task => "task",
            ResourceType::TimeEntry => "time_entry",
            ResourceType::Employee => "employee",
            ResourceType::Department => "department",
            ResourceType::Organization => "organization",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ResourceType::ALL
            .into_iter()
            .find(|rt| rt.as_str() == normalized)
            .ok_or_else(|| ParseEnumError::new("resource type", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    AssignEmployees,
    ManageDepartmentMembers,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::AssignEmployees,
        Action::ManageDepartmentMembers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::AssignEmployees => "assign_employees",
            Action::ManageDepartmentMembers => "manage_department_members",
        }
    }

    /// Actions that target one existing instance and therefore need its
    /// ownership/department context to be checked against the actor's scope.
    pub fn is_instance_scoped(&self) -> bool {
        matches!(
            self,
            Action::Update
                | Action::Delete
                | Action::AssignEmployees
                | Action::ManageDepartmentMembers
        )
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, Action::Read)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| ParseEnumError::new("action", s))
    }
}

/// The only facts about a domain object the policy engine looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInstance {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enterprise_wide: Option<bool>,
}

impl ResourceInstance {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    pub fn enterprise_wide(mut self, flag: bool) -> Self {
        self.is_enterprise_wide = Some(flag);
        self
    }

    /// An absent flag counts as restricted.
    pub fn is_enterprise_wide(&self) -> bool {
        self.is_enterprise_wide.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_snake_and_kebab_case() {
        assert_eq!("time-entry".parse::<ResourceType>().ok(), Some(ResourceType::TimeEntry));
        assert_eq!("assign_employees".parse::<Action>().ok(), Some(Action::AssignEmployees));
        assert!("invoice".parse::<ResourceType>().is_err());
    }

    #[test]
    fn read_is_the_only_non_mutating_action() {
        let non_mutating: Vec<_> = Action::ALL.into_iter().filter(|a| !a.is_mutating()).collect();
        assert_eq!(non_mutating, vec![Action::Read]);
        assert!(!Action::Create.is_instance_scoped());
        assert!(Action::ManageDepartmentMembers.is_instance_scoped());
    }

    #[test]
    fn missing_enterprise_flag_is_restricted() {
        assert!(!ResourceInstance::new("p1").is_enterprise_wide());
        assert!(ResourceInstance::new("p1").enterprise_wide(true).is_enterprise_wide());
    }
}
