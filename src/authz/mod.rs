//! Authorization module - policy registry, evaluator and scope resolver
//!
//! This module implements the role-based policy engine with support for:
//! - A validated, immutable capability table per policy version
//! - Instance checks against ownership, department and enterprise-wide scopes
//! - Declarative read scopes handed to the storage layer
//! - A single facade shared by every caller

mod decision;
mod evaluator;
mod facade;
mod registry;
mod scope;

pub use decision::{Decision, DenyReason};
pub use evaluator::{Evaluation, PolicyEvaluator};
pub use facade::{Authorize, Authorizer};
pub use registry::{
    embedded_source, embedded_versions, CapabilitySet, Divergence, PolicyDocument, Registry,
    ResourceGrant, ResourceShape, ScopeMode, DEFAULT_POLICY_VERSION,
};
pub use scope::{ScopeDescriptor, ScopeResolver};
