//! Instance specification value object.

use serde::{Deserialize, Serialize};

/// Hardware specification and list price of an instance type.
///
/// A copy is stored on every server at creation time, so later catalog
/// changes never alter the price of an existing server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub storage_gb: u32,
    pub bandwidth_tb: f64,
    /// Monthly list price in USD.
    pub monthly_price: f64,
}

impl InstanceSpec {
    pub const fn new(
        cpu_cores: u32,
        memory_gb: u32,
        storage_gb: u32,
        bandwidth_tb: f64,
        monthly_price: f64,
    ) -> Self {
        Self {
            cpu_cores,
            memory_gb,
            storage_gb,
            bandwidth_tb,
            monthly_price,
        }
    }
}
