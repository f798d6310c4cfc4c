//! Deployment database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{counter_from_db, counter_to_db};
use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{Deployment, DeploymentStatus};
use crate::{Error, Result};

/// Deployment database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeploymentDbModel {
    pub id: String,
    pub server_id: String,
    pub organization_id: String,
    pub name: String,
    pub repository_url: Option<String>,
    pub branch: String,
    /// Pipeline status (pending, building, deployed, failed).
    pub status: String,
    pub build_log: String,
    pub generation: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&Deployment> for DeploymentDbModel {
    fn from(deployment: &Deployment) -> Self {
        Self {
            id: deployment.id.clone(),
            server_id: deployment.server_id.clone(),
            organization_id: deployment.organization_id.clone(),
            name: deployment.name.clone(),
            repository_url: deployment.repository_url.clone(),
            branch: deployment.branch.clone(),
            status: deployment.status.as_str().to_string(),
            build_log: deployment.build_log.clone(),
            generation: counter_to_db(deployment.generation),
            created_at: datetime_to_ms(deployment.created_at),
            updated_at: datetime_to_ms(deployment.updated_at),
        }
    }
}

impl TryFrom<DeploymentDbModel> for Deployment {
    type Error = Error;

    fn try_from(row: DeploymentDbModel) -> Result<Self> {
        let status = DeploymentStatus::parse(&row.status)
            .ok_or_else(|| Error::Database(format!("unknown deployment status: {}", row.status)))?;

        Ok(Self {
            generation: counter_from_db("generation", row.generation)?,
            created_at: ms_to_datetime(row.created_at),
            updated_at: ms_to_datetime(row.updated_at),
            id: row.id,
            server_id: row.server_id,
            organization_id: row.organization_id,
            name: row.name,
            repository_url: row.repository_url,
            branch: row.branch,
            status,
            build_log: row.build_log,
        })
    }
}
