//! Simulated build-and-deploy pipeline.

mod pipeline;

pub use pipeline::{CreateDeploymentRequest, DeploymentPipeline};
