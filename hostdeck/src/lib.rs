//! hostdeck library crate.
//!
//! Core of a multi-cloud hosting dashboard: server lifecycle, metrics
//! collection, deployments, monitoring and billing.

pub mod billing;
pub mod catalog;
pub mod config;
pub mod database;
pub mod deployment;
pub mod domain;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod monitoring;
pub mod runtime;
pub mod scheduler;
pub mod server;
pub mod services;
pub mod utils;

pub use error::{Error, Result};
