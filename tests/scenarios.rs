use anyhow::Result;

use timetrack_authz::authz::{Authorize, Authorizer, DEFAULT_POLICY_VERSION};
use timetrack_authz::{
    Action, Actor, Decision, DenyReason, ResourceInstance, ResourceType, Role, ScopeDescriptor,
};

fn authorizer() -> Result<Authorizer> {
    Ok(Authorizer::load(DEFAULT_POLICY_VERSION)?)
}

#[test]
fn admin_deletes_anything_regardless_of_owner() -> Result<()> {
    let authz = authorizer()?;
    let admin = Actor::new("a1", Role::Admin, "org-1");

    for resource in ResourceType::ALL {
        let instance = ResourceInstance::new("x1")
            .with_owner("someone-else")
            .with_department("d9")
            .enterprise_wide(false);
        assert_eq!(
            authz.can(&admin, Action::Delete, resource, Some(&instance)),
            Decision::Allow,
            "{resource}"
        );
        assert_eq!(authz.scope_for(&admin, resource), ScopeDescriptor::All);
    }
    Ok(())
}

#[test]
fn employee_updates_only_own_time_entries() -> Result<()> {
    let authz = authorizer()?;
    let employee = Actor::new("u1", Role::Employee, "org-1").with_department("d1");

    let own = ResourceInstance::new("te-1").with_owner("u1");
    let colleague = ResourceInstance::new("te-2").with_owner("u2").with_department("d1");

    assert_eq!(
        authz.can(&employee, Action::Update, ResourceType::TimeEntry, Some(&own)),
        Decision::Allow
    );
    assert_eq!(
        authz.can(&employee, Action::Update, ResourceType::TimeEntry, Some(&colleague)),
        Decision::Deny(DenyReason::OutOfScope)
    );
    assert_eq!(
        authz.scope_for(&employee, ResourceType::TimeEntry),
        ScopeDescriptor::OwnOnly {
            owner_id: "u1".to_string()
        }
    );
    Ok(())
}

#[test]
fn manager_sees_own_department_time_entries() -> Result<()> {
    let authz = authorizer()?;
    let manager = Actor::new("m1", Role::Manager, "org-1").with_department("d1");

    assert_eq!(
        authz.scope_for(&manager, ResourceType::TimeEntry),
        ScopeDescriptor::DepartmentScoped {
            department_id: "d1".to_string()
        }
    );

    let in_department = ResourceInstance::new("te-1").with_owner("u5").with_department("d1");
    let elsewhere = ResourceInstance::new("te-2").with_owner("u6").with_department("d2");
    assert_eq!(
        authz.can(&manager, Action::Update, ResourceType::TimeEntry, Some(&in_department)),
        Decision::Allow
    );
    assert_eq!(
        authz.can(&manager, Action::Update, ResourceType::TimeEntry, Some(&elsewhere)),
        Decision::Deny(DenyReason::OutOfScope)
    );
    Ok(())
}

#[test]
fn manager_keeps_access_to_own_records_outside_department() -> Result<()> {
    let authz = authorizer()?;
    let manager = Actor::new("m1", Role::Manager, "org-1").with_department("d1");

    let own_unassigned = ResourceInstance::new("te-1").with_owner("m1");
    let own_elsewhere = ResourceInstance::new("te-2").with_owner("m1").with_department("d2");
    let foreign_elsewhere = ResourceInstance::new("te-3").with_owner("u4").with_department("d2");

    for entry in [&own_unassigned, &own_elsewhere] {
        assert_eq!(
            authz.can(&manager, Action::Update, ResourceType::TimeEntry, Some(entry)),
            Decision::Allow,
            "{}",
            entry.id
        );
    }
    assert_eq!(
        authz.can(&manager, Action::Update, ResourceType::TimeEntry, Some(&foreign_elsewhere)),
        Decision::Deny(DenyReason::OutOfScope)
    );

    let own_profile = ResourceInstance::new("m1").with_owner("m1");
    assert_eq!(
        authz.can(&manager, Action::Read, ResourceType::Employee, Some(&own_profile)),
        Decision::Allow
    );
    Ok(())
}

#[test]
fn manager_without_department_falls_back_to_own_entries() -> Result<()> {
    let authz = authorizer()?;
    let manager = Actor::new("m1", Role::Manager, "org-1");

    assert_eq!(
        authz.scope_for(&manager, ResourceType::TimeEntry),
        ScopeDescriptor::OwnOnly {
            owner_id: "m1".to_string()
        }
    );
    Ok(())
}

#[test]
fn employee_sees_enterprise_wide_and_own_projects() -> Result<()> {
    let authz = authorizer()?;
    let employee = Actor::new("u1", Role::Employee, "org-1").with_department("d1");

    let scope = authz.scope_for(&employee, ResourceType::Project);
    assert_eq!(
        scope,
        ScopeDescriptor::EnterpriseWideOnly {
            owner_id: "u1".to_string()
        }
    );

    let public = ResourceInstance::new("p1").with_owner("u9").enterprise_wide(true);
    let restricted = ResourceInstance::new("p2").with_owner("u9").enterprise_wide(false);
    let unflagged = ResourceInstance::new("p3").with_owner("u9");
    let own_restricted = ResourceInstance::new("p4").with_owner("u1").enterprise_wide(false);

    let visible: Vec<&str> = [&public, &restricted, &unflagged, &own_restricted]
        .into_iter()
        .filter(|project| scope.admits(project))
        .map(|project| project.id.as_str())
        .collect();
    assert_eq!(visible, vec!["p1", "p4"]);

    assert_eq!(
        authz.can(&employee, Action::Read, ResourceType::Project, Some(&restricted)),
        Decision::Deny(DenyReason::OutOfScope)
    );
    Ok(())
}

#[test]
fn viewer_reads_but_never_writes() -> Result<()> {
    let authz = authorizer()?;
    let viewer = Actor::new("v1", Role::Viewer, "org-1").with_department("d1");
    let own = ResourceInstance::new("te-1").with_owner("v1");

    assert_eq!(
        authz.can(&viewer, Action::Read, ResourceType::TimeEntry, Some(&own)),
        Decision::Allow
    );
    for action in [Action::Create, Action::Update, Action::Delete] {
        assert_eq!(
            authz.can(&viewer, action, ResourceType::TimeEntry, Some(&own)),
            Decision::Deny(DenyReason::RoleLacksCapability),
            "{action}"
        );
    }
    Ok(())
}

#[test]
fn scoped_mutation_without_instance_fails_closed() -> Result<()> {
    let authz = authorizer()?;
    let employee = Actor::new("u1", Role::Employee, "org-1");
    let admin = Actor::new("a1", Role::Admin, "org-1");

    assert_eq!(
        authz.can(&employee, Action::Update, ResourceType::TimeEntry, None),
        Decision::Deny(DenyReason::MissingInstanceContext)
    );
    assert_eq!(
        authz.can(&admin, Action::Delete, ResourceType::Organization, None),
        Decision::Deny(DenyReason::MissingInstanceContext)
    );
    // Create and read are type-level
    assert_eq!(
        authz.can(&employee, Action::Create, ResourceType::TimeEntry, None),
        Decision::Allow
    );
    Ok(())
}

#[test]
fn organization_and_department_deletion_is_admin_only() -> Result<()> {
    let authz = authorizer()?;
    let org = ResourceInstance::new("org-1");
    let department = ResourceInstance::new("d1").with_department("d1");

    for role in Role::ALL {
        let actor = Actor::new("x1", role, "org-1").with_department("d1");
        let expected = if role == Role::Admin {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::RoleLacksCapability)
        };
        assert_eq!(
            authz.can(&actor, Action::Delete, ResourceType::Organization, Some(&org)),
            expected
        );
        assert_eq!(
            authz.can(&actor, Action::Delete, ResourceType::Department, Some(&department)),
            expected
        );
    }

    let documented: Vec<ResourceType> = authz
        .registry()
        .divergences()
        .iter()
        .map(|divergence| divergence.resource)
        .collect();
    assert!(documented.contains(&ResourceType::Organization));
    assert!(documented.contains(&ResourceType::Department));
    Ok(())
}

#[test]
fn project_manager_assigns_employees_to_any_project() -> Result<()> {
    let authz = authorizer()?;
    let pm = Actor::new("pm1", Role::ProjectManager, "org-1");
    let project = ResourceInstance::new("p1").with_owner("u9").enterprise_wide(false);

    assert_eq!(
        authz.can(&pm, Action::AssignEmployees, ResourceType::Project, Some(&project)),
        Decision::Allow
    );

    let manager = Actor::new("m1", Role::Manager, "org-1").with_department("d1");
    assert_eq!(
        authz.can(&manager, Action::AssignEmployees, ResourceType::Project, Some(&project)),
        Decision::Deny(DenyReason::RoleLacksCapability)
    );
    Ok(())
}

#[test]
fn unknown_role_claim_gets_employee_access() -> Result<()> {
    let authz = authorizer()?;
    let actor = Actor::from_identity("u1", Some("root"), "org-1");

    assert_eq!(actor.role, Role::Employee);
    assert_eq!(
        authz.can(
            &actor,
            Action::Delete,
            ResourceType::Project,
            Some(&ResourceInstance::new("p1"))
        ),
        Decision::Deny(DenyReason::RoleLacksCapability)
    );
    Ok(())
}
