//! Runtime configuration.
//!
//! Every tunable has a default; `CoreConfig::from_env` overrides them from
//! `HOSTDECK_*` environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default database URL. Empty means the in-memory store.
pub const DEFAULT_DATABASE_URL: &str = "";

/// Server lifecycle tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Simulated provisioning time.
    #[serde(with = "duration_ms")]
    pub provisioning_delay: Duration,
    /// Probability in `[0, 1]` that provisioning fails.
    pub provisioning_failure_rate: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            provisioning_delay: Duration::from_secs(3),
            provisioning_failure_rate: 0.0,
        }
    }
}

/// Metrics collector tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    #[serde(with = "duration_ms")]
    pub interval: Duration,
    /// Samples kept per server.
    pub retention: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            retention: 1000,
        }
    }
}

/// Deployment pipeline tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delay before `pending -> building`.
    #[serde(with = "duration_ms")]
    pub build_delay: Duration,
    /// Delay before the build resolves.
    #[serde(with = "duration_ms")]
    pub deploy_delay: Duration,
    /// Probability in `[0, 1]` that a build succeeds.
    pub success_probability: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            build_delay: Duration::from_secs(2),
            deploy_delay: Duration::from_secs(5),
            success_probability: 0.8,
        }
    }
}

/// Alert thresholds and limits. Thresholds are exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    pub disk_threshold: f64,
    pub max_alerts: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: 80.0,
            memory_threshold: 85.0,
            disk_threshold: 90.0,
            max_alerts: 10,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub database_url: String,
    pub event_capacity: usize,
    pub lifecycle: LifecycleConfig,
    pub collector: CollectorConfig,
    pub pipeline: PipelineConfig,
    pub monitoring: MonitoringConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            event_capacity: 256,
            lifecycle: LifecycleConfig::default(),
            collector: CollectorConfig::default(),
            pipeline: PipelineConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Load from the process environment on top of defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(url) = var("HOSTDECK_DATABASE_URL").or_else(|| var("DATABASE_URL")) {
            config.database_url = url;
        }
        if let Some(v) = var("HOSTDECK_EVENT_CAPACITY") {
            config.event_capacity = parse_var("HOSTDECK_EVENT_CAPACITY", &v)?;
        }
        if let Some(v) = var("HOSTDECK_PROVISIONING_DELAY_MS") {
            config.lifecycle.provisioning_delay =
                Duration::from_millis(parse_var("HOSTDECK_PROVISIONING_DELAY_MS", &v)?);
        }
        if let Some(v) = var("HOSTDECK_PROVISIONING_FAILURE_RATE") {
            config.lifecycle.provisioning_failure_rate =
                parse_var("HOSTDECK_PROVISIONING_FAILURE_RATE", &v)?;
        }
        if let Some(v) = var("HOSTDECK_METRICS_INTERVAL_MS") {
            config.collector.interval =
                Duration::from_millis(parse_var("HOSTDECK_METRICS_INTERVAL_MS", &v)?);
        }
        if let Some(v) = var("HOSTDECK_METRICS_RETENTION") {
            config.collector.retention = parse_var("HOSTDECK_METRICS_RETENTION", &v)?;
        }
        if let Some(v) = var("HOSTDECK_BUILD_DELAY_MS") {
            config.pipeline.build_delay = Duration::from_millis(parse_var("HOSTDECK_BUILD_DELAY_MS", &v)?);
        }
        if let Some(v) = var("HOSTDECK_DEPLOY_DELAY_MS") {
            config.pipeline.deploy_delay =
                Duration::from_millis(parse_var("HOSTDECK_DEPLOY_DELAY_MS", &v)?);
        }
        if let Some(v) = var("HOSTDECK_DEPLOY_SUCCESS_PROBABILITY") {
            config.pipeline.success_probability =
                parse_var("HOSTDECK_DEPLOY_SUCCESS_PROBABILITY", &v)?;
        }
        if let Some(v) = var("HOSTDECK_MAX_ALERTS") {
            config.monitoring.max_alerts = parse_var("HOSTDECK_MAX_ALERTS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        check_probability(
            "provisioning_failure_rate",
            self.lifecycle.provisioning_failure_rate,
        )?;
        check_probability("success_probability", self.pipeline.success_probability)?;

        if self.collector.interval.is_zero() {
            return Err(Error::config("collector interval must be greater than zero"));
        }
        if self.collector.retention == 0 {
            return Err(Error::config("metric retention must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(Error::config("event capacity must be at least 1"));
        }
        for (name, value) in [
            ("cpu_threshold", self.monitoring.cpu_threshold),
            ("memory_threshold", self.monitoring.memory_threshold),
            ("disk_threshold", self.monitoring.disk_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(Error::config(format!("{} must be within 0-100, got {}", name, value)));
            }
        }
        Ok(())
    }

    /// Whether the SQLite store is configured.
    pub fn uses_database(&self) -> bool {
        !self.database_url.is_empty()
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| Error::config(format!("Invalid {}: {} ({})", key, value, e)))
}

fn check_probability(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::config(format!("{} must be within 0-1, got {}", name, value)))
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
