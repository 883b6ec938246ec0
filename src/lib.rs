pub mod audit;
pub mod authz;
pub mod config;
pub mod errors;
pub mod models;

// Re-export commonly used items for callers and tests
pub use authz::{Authorize, Authorizer, Decision, DenyReason, ScopeDescriptor};
pub use models::{Action, Actor, ResourceInstance, ResourceType, Role};
