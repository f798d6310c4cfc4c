//! Domain value objects.
//!
//! Value objects are immutable objects that represent concepts in the domain
//! and are defined by their attributes rather than identity.

mod instance_spec;
mod provider;

pub use instance_spec::InstanceSpec;
pub use provider::Provider;
