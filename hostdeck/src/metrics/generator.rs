//! Synthetic sample generation.

use std::ops::Range;

use chrono::{DateTime, Utc};

use crate::domain::MetricSample;
use crate::runtime::RandomSource;

const MIB: u64 = 1024 * 1024;

/// Value ranges for generated samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGenerator {
    pub cpu: Range<f64>,
    pub memory: Range<f64>,
    pub disk: Range<f64>,
    /// Bytes per tick.
    pub network_in: Range<u64>,
    pub network_out: Range<u64>,
}

impl Default for SampleGenerator {
    fn default() -> Self {
        Self {
            cpu: 5.0..95.0,
            memory: 20.0..90.0,
            disk: 10.0..85.0,
            network_in: 0..10 * MIB,
            network_out: 0..5 * MIB,
        }
    }
}

impl SampleGenerator {
    /// Draw one sample for `server_id` at `timestamp`.
    pub fn generate(
        &self,
        server_id: &str,
        timestamp: DateTime<Utc>,
        random: &dyn RandomSource,
    ) -> MetricSample {
        let percent = |range: &Range<f64>| one_decimal(random.range_f64(range.start, range.end));

        MetricSample::new(server_id, timestamp)
            .with_usage(percent(&self.cpu), percent(&self.memory), percent(&self.disk))
            .with_network(
                random.range_u64(self.network_in.start, self.network_in.end),
                random.range_u64(self.network_out.start, self.network_out.end),
            )
    }
}

fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::SeededRandom;

    #[test]
    fn test_generated_values_in_range() {
        let generator = SampleGenerator::default();
        let random = SeededRandom::new(3);
        let now = Utc::now();

        for _ in 0..500 {
            let sample = generator.generate("s1", now, &random);
            assert!((5.0..=95.0).contains(&sample.cpu_usage));
            assert!((20.0..=90.0).contains(&sample.memory_usage));
            assert!((10.0..=85.0).contains(&sample.disk_usage));
            assert!(sample.network_in < 10 * MIB);
            assert!(sample.network_out < 5 * MIB);
            assert_eq!(one_decimal(sample.cpu_usage), sample.cpu_usage);
        }
    }
}
