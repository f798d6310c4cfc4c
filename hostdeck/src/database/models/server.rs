//! Server database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{counter_from_db, counter_to_db};
use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{InstanceSpec, Provider, Server, ServerStatus};
use crate::{Error, Result};

/// Server database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ServerDbModel {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    /// Provider key (aws, gcp, azure, digitalocean).
    pub provider: String,
    pub instance_type: String,
    pub region: String,
    pub cpu_cores: i64,
    pub memory_gb: i64,
    pub storage_gb: i64,
    pub bandwidth_tb: f64,
    pub monthly_price: f64,
    /// Lifecycle status (pending, running, stopped, failed, terminated).
    pub status: String,
    pub ip_address: Option<String>,
    pub failure_reason: Option<String>,
    pub generation: i64,
    /// Unix epoch milliseconds (UTC).
    pub created_at: i64,
    /// Unix epoch milliseconds (UTC).
    pub updated_at: i64,
}

impl From<&Server> for ServerDbModel {
    fn from(server: &Server) -> Self {
        Self {
            id: server.id.clone(),
            organization_id: server.organization_id.clone(),
            name: server.name.clone(),
            provider: server.provider.as_str().to_string(),
            instance_type: server.instance_type.clone(),
            region: server.region.clone(),
            cpu_cores: i64::from(server.spec.cpu_cores),
            memory_gb: i64::from(server.spec.memory_gb),
            storage_gb: i64::from(server.spec.storage_gb),
            bandwidth_tb: server.spec.bandwidth_tb,
            monthly_price: server.spec.monthly_price,
            status: server.status.as_str().to_string(),
            ip_address: server.ip_address.clone(),
            failure_reason: server.failure_reason.clone(),
            generation: counter_to_db(server.generation),
            created_at: datetime_to_ms(server.created_at),
            updated_at: datetime_to_ms(server.updated_at),
        }
    }
}

fn dimension(field: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Database(format!("invalid {}: {}", field, value)))
}

impl TryFrom<ServerDbModel> for Server {
    type Error = Error;

    fn try_from(row: ServerDbModel) -> Result<Self> {
        let provider = Provider::parse(&row.provider)
            .ok_or_else(|| Error::Database(format!("unknown provider: {}", row.provider)))?;
        let status = ServerStatus::parse(&row.status)
            .ok_or_else(|| Error::Database(format!("unknown server status: {}", row.status)))?;

        Ok(Self {
            spec: InstanceSpec::new(
                dimension("cpu_cores", row.cpu_cores)?,
                dimension("memory_gb", row.memory_gb)?,
                dimension("storage_gb", row.storage_gb)?,
                row.bandwidth_tb,
                row.monthly_price,
            ),
            generation: counter_from_db("generation", row.generation)?,
            created_at: ms_to_datetime(row.created_at),
            updated_at: ms_to_datetime(row.updated_at),
            id: row.id,
            organization_id: row.organization_id,
            name: row.name,
            provider,
            instance_type: row.instance_type,
            region: row.region,
            status,
            ip_address: row.ip_address,
            failure_reason: row.failure_reason,
        })
    }
}
