//! Deployment domain module.

mod entity;
mod state;

pub use entity::Deployment;
pub use state::DeploymentStatus;
