//! Domain layer for hostdeck.
//!
//! This module contains the core entities, their state machines, and value objects.

pub mod deployment;
pub mod metric;
pub mod server;
pub mod value_objects;

pub use deployment::{Deployment, DeploymentStatus};
pub use metric::MetricSample;
pub use server::{Server, ServerStatus};
pub use value_objects::*;
