use anyhow::Result;
use proptest::prelude::*;

use timetrack_authz::authz::{Authorize, Authorizer, DEFAULT_POLICY_VERSION};
use timetrack_authz::{Action, Actor, Decision, DenyReason, ResourceInstance, ResourceType, Role};

fn authorizer() -> Authorizer {
    Authorizer::load(DEFAULT_POLICY_VERSION).expect("embedded policy must validate")
}

/// One instance per interesting shape: owned by the actor, owned by someone
/// else, in the actor's department, enterprise-wide.
fn sample_instances() -> Vec<ResourceInstance> {
    vec![
        ResourceInstance::new("own").with_owner("u1").with_department("d1"),
        ResourceInstance::new("foreign").with_owner("u2").with_department("d2"),
        ResourceInstance::new("same-dept").with_owner("u3").with_department("d1"),
        ResourceInstance::new("public").with_owner("u4").enterprise_wide(true),
    ]
}

#[test]
fn every_triple_has_a_defined_outcome() -> Result<()> {
    let authorizer = authorizer();
    let registry = authorizer.registry();

    let mut checked = 0;
    for role in Role::ALL {
        let caps = registry.capabilities_for(role);
        assert_eq!(caps.role(), role);
        for resource in ResourceType::ALL {
            for action in Action::ALL {
                // allows() is total; pin it against the evaluator so a gap
                // cannot hide behind a default.
                let actor = Actor::new("u1", role, "org-1").with_department("d1");
                let instance = ResourceInstance::new("x").with_owner("u1").with_department("d1");
                let decision = authorizer.can(&actor, action, resource, Some(&instance));
                if !caps.allows(resource, action) {
                    assert_eq!(decision, Decision::Deny(DenyReason::RoleLacksCapability));
                }
                checked += 1;
            }
        }
    }

    assert_eq!(checked, Role::ALL.len() * ResourceType::ALL.len() * Action::ALL.len());
    Ok(())
}

#[test]
fn admin_dominates_every_role() -> Result<()> {
    let authorizer = authorizer();
    let registry = authorizer.registry();
    let admin = registry.capabilities_for(Role::Admin);

    for role in Role::ALL {
        let caps = registry.capabilities_for(role);
        for resource in ResourceType::ALL {
            for action in Action::ALL {
                assert!(
                    admin.allows(resource, action) >= caps.allows(resource, action),
                    "{role} may {action} {resource} but admin may not"
                );
            }
        }
    }
    Ok(())
}

#[test]
fn scoped_actions_without_instance_always_fail_closed() -> Result<()> {
    let authorizer = authorizer();

    for role in Role::ALL {
        let actor = Actor::new("u1", role, "org-1").with_department("d1");
        for resource in ResourceType::ALL {
            for action in Action::ALL.into_iter().filter(Action::is_instance_scoped) {
                assert_eq!(
                    authorizer.can(&actor, action, resource, None),
                    Decision::Deny(DenyReason::MissingInstanceContext),
                    "{role} {action} {resource}"
                );
            }
        }
    }
    Ok(())
}

#[test]
fn unmapped_role_behaves_exactly_like_employee() -> Result<()> {
    let authorizer = authorizer();
    let employee = Actor::new("u1", Role::Employee, "org-1").with_department("d1");
    let unmapped = Actor::from_identity("u1", Some("chief_wizard"), "org-1").with_department("d1");

    for resource in ResourceType::ALL {
        assert_eq!(
            authorizer.scope_for(&unmapped, resource),
            authorizer.scope_for(&employee, resource)
        );
        for action in Action::ALL {
            assert_eq!(
                authorizer.can(&unmapped, action, resource, None),
                authorizer.can(&employee, action, resource, None)
            );
            for instance in sample_instances() {
                assert_eq!(
                    authorizer.can(&unmapped, action, resource, Some(&instance)),
                    authorizer.can(&employee, action, resource, Some(&instance)),
                    "{action} {resource} {}",
                    instance.id
                );
            }
        }
    }
    Ok(())
}

#[test]
fn widest_scope_never_admits_a_denied_read() -> Result<()> {
    let authorizer = authorizer();

    for role in Role::ALL {
        let actor = Actor::new("u1", role, "org-1").with_department("d1");
        for resource in ResourceType::ALL {
            let scope = authorizer.scope_for(&actor, resource);
            for instance in sample_instances() {
                let decision = authorizer.can(&actor, Action::Read, resource, Some(&instance));
                if scope.admits(&instance) {
                    assert_eq!(
                        decision,
                        Decision::Allow,
                        "{role} read {resource} {}",
                        instance.id
                    );
                }
            }
        }
    }
    Ok(())
}

fn any_role() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::ALL.to_vec())
}

fn any_resource() -> impl Strategy<Value = ResourceType> {
    prop::sample::select(ResourceType::ALL.to_vec())
}

fn any_action() -> impl Strategy<Value = Action> {
    prop::sample::select(Action::ALL.to_vec())
}

proptest! {
    /// Employee updates of time entries are allowed exactly for their own entries.
    #[test]
    fn own_only_update_allowed_iff_owner(
        actor_id in "[a-z0-9]{1,8}",
        other_id in "[a-z0-9]{1,8}",
        same in any::<bool>(),
    ) {
        let authorizer = authorizer();
        let actor = Actor::new(actor_id.clone(), Role::Employee, "org-1");
        let owner = if same { actor_id.clone() } else { other_id };
        let instance = ResourceInstance::new("entry").with_owner(owner.clone());

        let decision =
            authorizer.can(&actor, Action::Update, ResourceType::TimeEntry, Some(&instance));
        if owner == actor_id {
            prop_assert_eq!(decision, Decision::Allow);
        } else {
            prop_assert_eq!(decision, Decision::Deny(DenyReason::OutOfScope));
        }
    }

    /// Same inputs, same answers.
    #[test]
    fn decisions_are_idempotent(
        role in any_role(),
        resource in any_resource(),
        action in any_action(),
        owner in prop::option::of("u[0-9]"),
        department in prop::option::of("d[0-9]"),
        enterprise_wide in prop::option::of(any::<bool>()),
    ) {
        let authorizer = authorizer();
        let actor = Actor::new("u1", role, "org-1").with_department("d1");
        let instance = ResourceInstance {
            id: "i1".to_string(),
            owner_id: owner,
            department_id: department,
            is_enterprise_wide: enterprise_wide,
        };

        let first = authorizer.can(&actor, action, resource, Some(&instance));
        let first_scope = authorizer.scope_for(&actor, resource);
        for _ in 0..3 {
            prop_assert_eq!(authorizer.can(&actor, action, resource, Some(&instance)), first);
            prop_assert_eq!(authorizer.scope_for(&actor, resource), first_scope.clone());
        }
    }
}
