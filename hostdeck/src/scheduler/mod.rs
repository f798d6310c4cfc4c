//! Background task scheduling.
//!
//! Every background job in hostdeck (metric collection loops, provisioning
//! completions, deployment stages) runs as a tokio task tracked by a
//! [`TaskRegistry`] and stopped through a child [`CancellationToken`] of the
//! service container's root token.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod registry;
pub mod task;

pub use registry::TaskRegistry;
pub use task::{TaskHandle, TaskKind};
