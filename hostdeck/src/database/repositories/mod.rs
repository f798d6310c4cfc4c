//! Repository layer for data access.
//!
//! Repositories speak domain types; the SQLite implementations convert to and
//! from the row models in [`crate::database::models`].

pub mod deployment;
pub mod memory;
pub mod metric;
pub mod server;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::domain::{Deployment, MetricSample, Provider, Server, ServerStatus};

pub use deployment::SqlxDeploymentRepository;
pub use memory::InMemoryStore;
pub use metric::SqlxMetricRepository;
pub use server::SqlxServerRepository;

/// Optional filters for listing servers. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerFilter {
    pub organization_id: Option<String>,
    pub status: Option<ServerStatus>,
    pub provider: Option<Provider>,
}

impl ServerFilter {
    pub fn for_organization(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: Some(organization_id.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: ServerStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn matches(&self, server: &Server) -> bool {
        self.organization_id
            .as_deref()
            .is_none_or(|org| server.organization_id == org)
            && self.status.is_none_or(|status| server.status == status)
            && self.provider.is_none_or(|provider| server.provider == provider)
    }
}

/// Server repository trait.
#[async_trait]
pub trait ServerRepository: Send + Sync {
    async fn create_server(&self, server: &Server) -> Result<()>;
    /// Get a server, failing with `NotFound` when absent.
    async fn get_server(&self, id: &str) -> Result<Server>;
    async fn find_server(&self, id: &str) -> Result<Option<Server>>;
    async fn update_server(&self, server: &Server) -> Result<()>;
    async fn delete_server(&self, id: &str) -> Result<()>;
    /// List servers matching the filter, oldest first.
    async fn list_servers(&self, filter: &ServerFilter) -> Result<Vec<Server>>;
}

/// Deployment repository trait.
#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    async fn create_deployment(&self, deployment: &Deployment) -> Result<()>;
    async fn get_deployment(&self, id: &str) -> Result<Deployment>;
    async fn find_deployment(&self, id: &str) -> Result<Option<Deployment>>;
    async fn update_deployment(&self, deployment: &Deployment) -> Result<()>;
    async fn delete_deployment(&self, id: &str) -> Result<()>;
    /// Deployments for a server, newest first.
    async fn list_deployments_for_server(&self, server_id: &str) -> Result<Vec<Deployment>>;
}

/// Metrics store trait.
#[async_trait]
pub trait MetricRepository: Send + Sync {
    async fn insert_metric(&self, sample: &MetricSample) -> Result<()>;
    /// Samples for the given servers with `since <= timestamp < until`,
    /// ascending by timestamp (insertion order breaks ties).
    async fn list_metrics(
        &self,
        server_ids: &[String],
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<MetricSample>>;
    /// Delete all but the `keep` most recent samples of a server.
    /// Returns the number of deleted samples.
    async fn prune_metrics(&self, server_id: &str, keep: usize) -> Result<u64>;
    async fn delete_metrics_for_server(&self, server_id: &str) -> Result<u64>;
    async fn count_metrics(&self, server_id: &str) -> Result<u64>;
}
