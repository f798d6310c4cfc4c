//! Monitoring aggregator.
//!
//! Pull-based and side-effect free: it only reads servers and samples.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MonitoringConfig;
use crate::database::repositories::{MetricRepository, ServerFilter, ServerRepository};
use crate::database::time::bucket_start;
use crate::domain::{MetricSample, Server, ServerStatus};
use crate::runtime::Clock;
use crate::{Error, Result};

/// Window the overview looks back over.
const OVERVIEW_WINDOW_HOURS: i64 = 1;

/// Server counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub stopped: usize,
    pub failed: usize,
    pub terminated: usize,
}

impl StatusCounts {
    fn add(&mut self, status: ServerStatus) {
        self.total += 1;
        match status {
            ServerStatus::Pending => self.pending += 1,
            ServerStatus::Running => self.running += 1,
            ServerStatus::Stopped => self.stopped += 1,
            ServerStatus::Failed => self.failed += 1,
            ServerStatus::Terminated => self.terminated += 1,
        }
    }

    pub fn get(&self, status: ServerStatus) -> usize {
        match status {
            ServerStatus::Pending => self.pending,
            ServerStatus::Running => self.running,
            ServerStatus::Stopped => self.stopped,
            ServerStatus::Failed => self.failed,
            ServerStatus::Terminated => self.terminated,
        }
    }
}

/// Mean utilization percentages. All zero when there are no samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageAverages {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
}

/// Which threshold a sample breached. Ordered by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Cpu,
    Memory,
    Disk,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Disk => "disk",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A threshold breach found in one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub server_id: String,
    pub server_name: String,
    pub kind: AlertKind,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Organization dashboard summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub status_counts: StatusCounts,
    pub averages: UsageAverages,
    /// Most recent first.
    pub alerts: Vec<Alert>,
    pub sample_count: usize,
    pub generated_at: DateTime<Utc>,
}

/// Means over one time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBucket {
    /// Bucket start, aligned to the bucket width from the Unix epoch.
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub network_in: f64,
    pub network_out: f64,
    pub sample_count: usize,
}

/// Bucketed history for one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub server_id: String,
    pub hours: u32,
    pub bucket_minutes: i64,
    /// Ascending by timestamp.
    pub buckets: Vec<MetricBucket>,
}

/// Bucket width for a look-back window of `hours`.
pub fn bucket_width(hours: u32) -> Duration {
    match hours {
        0..=24 => Duration::minutes(5),
        25..=168 => Duration::minutes(60),
        _ => Duration::minutes(360),
    }
}

#[derive(Debug, Default)]
struct BucketAccumulator {
    cpu: f64,
    memory: f64,
    disk: f64,
    network_in: f64,
    network_out: f64,
    count: usize,
}

impl BucketAccumulator {
    fn add(&mut self, sample: &MetricSample) {
        self.cpu += sample.cpu_usage;
        self.memory += sample.memory_usage;
        self.disk += sample.disk_usage;
        self.network_in += sample.network_in as f64;
        self.network_out += sample.network_out as f64;
        self.count += 1;
    }

    fn finish(self, timestamp: DateTime<Utc>) -> MetricBucket {
        let n = self.count.max(1) as f64;
        MetricBucket {
            timestamp,
            cpu_usage: self.cpu / n,
            memory_usage: self.memory / n,
            disk_usage: self.disk / n,
            network_in: self.network_in / n,
            network_out: self.network_out / n,
            sample_count: self.count,
        }
    }
}

/// Builds dashboard overviews and per-server histories.
pub struct MonitoringAggregator {
    config: MonitoringConfig,
    servers: Arc<dyn ServerRepository>,
    metrics: Arc<dyn MetricRepository>,
    clock: Arc<dyn Clock>,
}

impl MonitoringAggregator {
    pub fn new(
        config: MonitoringConfig,
        servers: Arc<dyn ServerRepository>,
        metrics: Arc<dyn MetricRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            servers,
            metrics,
            clock,
        }
    }

    /// Overview of an organization's servers.
    pub async fn overview_for_organization(&self, organization_id: &str) -> Result<Overview> {
        let servers = self
            .servers
            .list_servers(&ServerFilter::for_organization(organization_id))
            .await?;
        self.overview(&servers).await
    }

    /// Status counts, last-hour averages and recent alerts for `servers`.
    pub async fn overview(&self, servers: &[Server]) -> Result<Overview> {
        let now = self.clock.now();
        let mut status_counts = StatusCounts::default();
        for server in servers {
            status_counts.add(server.status);
        }

        let ids: Vec<String> = servers.iter().map(|s| s.id.clone()).collect();
        let since = now - Duration::hours(OVERVIEW_WINDOW_HOURS);
        let samples = self.metrics.list_metrics(&ids, since, None).await?;

        let averages = if samples.is_empty() {
            UsageAverages::default()
        } else {
            let n = samples.len() as f64;
            UsageAverages {
                cpu: samples.iter().map(|s| s.cpu_usage).sum::<f64>() / n,
                memory: samples.iter().map(|s| s.memory_usage).sum::<f64>() / n,
                disk: samples.iter().map(|s| s.disk_usage).sum::<f64>() / n,
            }
        };

        let names: BTreeMap<&str, &str> = servers
            .iter()
            .map(|s| (s.id.as_str(), s.name.as_str()))
            .collect();
        let alerts: Vec<Alert> = samples
            .iter()
            .rev()
            .filter_map(|sample| {
                let name = names.get(sample.server_id.as_str()).copied().unwrap_or_default();
                self.classify(sample, name)
            })
            .take(self.config.max_alerts)
            .collect();

        debug!(
            servers = servers.len(),
            samples = samples.len(),
            alerts = alerts.len(),
            "Built monitoring overview"
        );

        Ok(Overview {
            status_counts,
            averages,
            alerts,
            sample_count: samples.len(),
            generated_at: now,
        })
    }

    /// Bucketed means for one server over the last `hours`.
    pub async fn server_metrics(&self, server_id: &str, hours: u32) -> Result<MetricsReport> {
        if hours == 0 {
            return Err(Error::validation("hours must be at least 1"));
        }
        self.servers.get_server(server_id).await?;

        let now = self.clock.now();
        let width = bucket_width(hours);
        let since = now - Duration::hours(i64::from(hours));
        let samples = self
            .metrics
            .list_metrics(&[server_id.to_string()], since, None)
            .await?;

        let mut buckets: BTreeMap<DateTime<Utc>, BucketAccumulator> = BTreeMap::new();
        for sample in &samples {
            buckets
                .entry(bucket_start(sample.timestamp, width))
                .or_default()
                .add(sample);
        }

        Ok(MetricsReport {
            server_id: server_id.to_string(),
            hours,
            bucket_minutes: width.num_minutes(),
            buckets: buckets
                .into_iter()
                .map(|(start, acc)| acc.finish(start))
                .collect(),
        })
    }

    /// First breached threshold in priority order cpu, memory, disk.
    fn classify(&self, sample: &MetricSample, server_name: &str) -> Option<Alert> {
        let checks = [
            (AlertKind::Cpu, sample.cpu_usage, self.config.cpu_threshold),
            (AlertKind::Memory, sample.memory_usage, self.config.memory_threshold),
            (AlertKind::Disk, sample.disk_usage, self.config.disk_threshold),
        ];
        let (kind, value, threshold) = checks
            .into_iter()
            .find(|(_, value, threshold)| value > threshold)?;

        Some(Alert {
            server_id: sample.server_id.clone(),
            server_name: server_name.to_string(),
            kind,
            value,
            threshold,
            timestamp: sample.timestamp,
            message: format!(
                "High {} usage on {}: {:.1}% (threshold {:.0}%)",
                kind, server_name, value, threshold
            ),
        })
    }
}
