//! Metric sample entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One utilization reading for a server. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub id: String,
    pub server_id: String,
    pub timestamp: DateTime<Utc>,
    /// Percent, 0-100.
    pub cpu_usage: f64,
    /// Percent, 0-100.
    pub memory_usage: f64,
    /// Percent, 0-100.
    pub disk_usage: f64,
    /// Bytes received since the previous sample.
    pub network_in: u64,
    /// Bytes sent since the previous sample.
    pub network_out: u64,
}

impl MetricSample {
    pub fn new(server_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            server_id: server_id.into(),
            timestamp,
            cpu_usage: 0.0,
            memory_usage: 0.0,
            disk_usage: 0.0,
            network_in: 0,
            network_out: 0,
        }
    }

    /// Set the utilization percentages, clamped to 0-100.
    pub fn with_usage(mut self, cpu: f64, memory: f64, disk: f64) -> Self {
        self.cpu_usage = cpu.clamp(0.0, 100.0);
        self.memory_usage = memory.clamp(0.0, 100.0);
        self.disk_usage = disk.clamp(0.0, 100.0);
        self
    }

    pub fn with_network(mut self, network_in: u64, network_out: u64) -> Self {
        self.network_in = network_in;
        self.network_out = network_out;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_is_clamped() {
        let sample = MetricSample::new("s1", Utc::now()).with_usage(120.0, -3.0, 42.5);
        assert_eq!(sample.cpu_usage, 100.0);
        assert_eq!(sample.memory_usage, 0.0);
        assert_eq!(sample.disk_usage, 42.5);
    }
}
