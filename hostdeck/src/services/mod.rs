//! Service layer module.
//!
//! This module provides the service container and initialization logic
//! for all hostdeck services.

pub mod container;

pub use container::{ServiceContainer, ServiceStats, Stores};
