pub mod actor;
pub mod resource;
pub mod role;

pub use actor::Actor;
pub use resource::{Action, ResourceInstance, ResourceType};
pub use role::Role;
