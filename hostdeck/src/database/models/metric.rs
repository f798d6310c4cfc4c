//! Metric sample database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{counter_from_db, counter_to_db};
use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::MetricSample;
use crate::{Error, Result};

/// Metric sample database model.
///
/// `seq` is assigned by SQLite on insert and breaks timestamp ties.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MetricDbModel {
    pub seq: i64,
    pub id: String,
    pub server_id: String,
    pub timestamp: i64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub network_in: i64,
    pub network_out: i64,
}

impl From<&MetricSample> for MetricDbModel {
    fn from(sample: &MetricSample) -> Self {
        Self {
            seq: 0,
            id: sample.id.clone(),
            server_id: sample.server_id.clone(),
            timestamp: datetime_to_ms(sample.timestamp),
            cpu_usage: sample.cpu_usage,
            memory_usage: sample.memory_usage,
            disk_usage: sample.disk_usage,
            network_in: counter_to_db(sample.network_in),
            network_out: counter_to_db(sample.network_out),
        }
    }
}

impl TryFrom<MetricDbModel> for MetricSample {
    type Error = Error;

    fn try_from(row: MetricDbModel) -> Result<Self> {
        Ok(Self {
            network_in: counter_from_db("network_in", row.network_in)?,
            network_out: counter_from_db("network_out", row.network_out)?,
            timestamp: ms_to_datetime(row.timestamp),
            id: row.id,
            server_id: row.server_id,
            cpu_usage: row.cpu_usage,
            memory_usage: row.memory_usage,
            disk_usage: row.disk_usage,
        })
    }
}
