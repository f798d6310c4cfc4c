//! Read-side aggregation of recent metric samples.

mod aggregator;

pub use aggregator::{
    Alert, AlertKind, MetricBucket, MetricsReport, MonitoringAggregator, Overview, StatusCounts,
    UsageAverages, bucket_width,
};
