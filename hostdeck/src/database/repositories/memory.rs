//! In-memory store implementing every repository trait.
//!
//! Used by tests and by the daemon when no database URL is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{DeploymentRepository, MetricRepository, ServerFilter, ServerRepository};
use crate::domain::{Deployment, MetricSample, Server};
use crate::{Error, Result};

/// DashMap-backed store. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    servers: DashMap<String, Server>,
    deployments: DashMap<String, Deployment>,
    /// Per-server samples, ascending by timestamp; equal timestamps keep insertion order.
    metrics: DashMap<String, Vec<MetricSample>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServerRepository for InMemoryStore {
    async fn create_server(&self, server: &Server) -> Result<()> {
        if self.servers.contains_key(&server.id) {
            return Err(Error::Database(format!("server {} already exists", server.id)));
        }
        self.servers.insert(server.id.clone(), server.clone());
        Ok(())
    }

    async fn get_server(&self, id: &str) -> Result<Server> {
        self.find_server(id)
            .await?
            .ok_or_else(|| Error::not_found("Server", id))
    }

    async fn find_server(&self, id: &str) -> Result<Option<Server>> {
        Ok(self.servers.get(id).map(|entry| entry.value().clone()))
    }

    async fn update_server(&self, server: &Server) -> Result<()> {
        match self.servers.get_mut(&server.id) {
            Some(mut entry) => {
                *entry = server.clone();
                Ok(())
            }
            None => Err(Error::not_found("Server", &server.id)),
        }
    }

    async fn delete_server(&self, id: &str) -> Result<()> {
        self.servers.remove(id);
        Ok(())
    }

    async fn list_servers(&self, filter: &ServerFilter) -> Result<Vec<Server>> {
        let mut servers: Vec<Server> = self
            .servers
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        servers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(servers)
    }
}

#[async_trait]
impl DeploymentRepository for InMemoryStore {
    async fn create_deployment(&self, deployment: &Deployment) -> Result<()> {
        if self.deployments.contains_key(&deployment.id) {
            return Err(Error::Database(format!(
                "deployment {} already exists",
                deployment.id
            )));
        }
        self.deployments
            .insert(deployment.id.clone(), deployment.clone());
        Ok(())
    }

    async fn get_deployment(&self, id: &str) -> Result<Deployment> {
        self.find_deployment(id)
            .await?
            .ok_or_else(|| Error::not_found("Deployment", id))
    }

    async fn find_deployment(&self, id: &str) -> Result<Option<Deployment>> {
        Ok(self.deployments.get(id).map(|entry| entry.value().clone()))
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        match self.deployments.get_mut(&deployment.id) {
            Some(mut entry) => {
                *entry = deployment.clone();
                Ok(())
            }
            None => Err(Error::not_found("Deployment", &deployment.id)),
        }
    }

    async fn delete_deployment(&self, id: &str) -> Result<()> {
        self.deployments.remove(id);
        Ok(())
    }

    async fn list_deployments_for_server(&self, server_id: &str) -> Result<Vec<Deployment>> {
        let mut deployments: Vec<Deployment> = self
            .deployments
            .iter()
            .filter(|entry| entry.server_id == server_id)
            .map(|entry| entry.value().clone())
            .collect();
        deployments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(deployments)
    }
}

#[async_trait]
impl MetricRepository for InMemoryStore {
    async fn insert_metric(&self, sample: &MetricSample) -> Result<()> {
        let mut samples = self.metrics.entry(sample.server_id.clone()).or_default();
        let position = samples.partition_point(|existing| existing.timestamp <= sample.timestamp);
        samples.insert(position, sample.clone());
        Ok(())
    }

    async fn list_metrics(
        &self,
        server_ids: &[String],
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<MetricSample>> {
        let in_window = |sample: &MetricSample| {
            sample.timestamp >= since && until.is_none_or(|until| sample.timestamp < until)
        };

        let mut merged: Vec<MetricSample> = Vec::new();
        for server_id in server_ids {
            if let Some(samples) = self.metrics.get(server_id) {
                merged.extend(samples.iter().filter(|sample| in_window(sample)).cloned());
            }
        }
        // Stable sort keeps per-server insertion order for equal timestamps.
        merged.sort_by_key(|sample| sample.timestamp);
        Ok(merged)
    }

    async fn prune_metrics(&self, server_id: &str, keep: usize) -> Result<u64> {
        let Some(mut samples) = self.metrics.get_mut(server_id) else {
            return Ok(0);
        };
        let excess = samples.len().saturating_sub(keep);
        samples.drain(..excess);
        Ok(excess as u64)
    }

    async fn delete_metrics_for_server(&self, server_id: &str) -> Result<u64> {
        Ok(self
            .metrics
            .remove(server_id)
            .map(|(_, samples)| samples.len() as u64)
            .unwrap_or(0))
    }

    async fn count_metrics(&self, server_id: &str) -> Result<u64> {
        Ok(self
            .metrics
            .get(server_id)
            .map(|samples| samples.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstanceSpec, Provider, ServerStatus};
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn server(org: &str, provider: Provider, offset_secs: i64) -> Server {
        Server::new(
            org,
            "node",
            provider,
            "small",
            InstanceSpec::new(1, 1, 10, 1.0, 5.0),
            base_time() + Duration::seconds(offset_secs),
        )
    }

    #[tokio::test]
    async fn test_list_servers_filters() {
        let store = InMemoryStore::new();
        let a = server("org-a", Provider::Aws, 0);
        let mut b = server("org-a", Provider::Gcp, 1);
        b.mark_provisioned("203.0.113.1", base_time()).unwrap();
        let c = server("org-b", Provider::Aws, 2);
        for s in [&a, &b, &c] {
            store.create_server(s).await.unwrap();
        }

        let org_a = store
            .list_servers(&ServerFilter::for_organization("org-a"))
            .await
            .unwrap();
        assert_eq!(org_a.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec![a.id.as_str(), b.id.as_str()]);

        let running = store
            .list_servers(&ServerFilter::default().with_status(ServerStatus::Running))
            .await
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, b.id);

        let aws = store
            .list_servers(&ServerFilter::default().with_provider(Provider::Aws))
            .await
            .unwrap();
        assert_eq!(aws.len(), 2);
    }

    #[tokio::test]
    async fn test_update_missing_server() {
        let store = InMemoryStore::new();
        let result = store.update_server(&server("org", Provider::Aws, 0)).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_prune_keeps_most_recent() {
        let store = InMemoryStore::new();
        for i in 0..10 {
            let sample = MetricSample::new("s1", base_time() + Duration::seconds(i));
            store.insert_metric(&sample).await.unwrap();
        }

        assert_eq!(store.prune_metrics("s1", 4).await.unwrap(), 6);
        assert_eq!(store.count_metrics("s1").await.unwrap(), 4);

        let remaining = store
            .list_metrics(&["s1".to_string()], base_time(), None)
            .await
            .unwrap();
        let first = remaining.first().map(|s| s.timestamp);
        assert_eq!(first, Some(base_time() + Duration::seconds(6)));
        assert_eq!(store.prune_metrics("missing", 4).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_metrics_window_and_order() {
        let store = InMemoryStore::new();
        for (server_id, offset) in [("s1", 30), ("s2", 10), ("s1", 20), ("s3", 15), ("s2", 90)] {
            let sample = MetricSample::new(server_id, base_time() + Duration::seconds(offset));
            store.insert_metric(&sample).await.unwrap();
        }

        let samples = store
            .list_metrics(
                &["s1".to_string(), "s2".to_string()],
                base_time() + Duration::seconds(10),
                Some(base_time() + Duration::seconds(60)),
            )
            .await
            .unwrap();
        let offsets: Vec<i64> = samples
            .iter()
            .map(|s| (s.timestamp - base_time()).num_seconds())
            .collect();
        assert_eq!(offsets, vec![10, 20, 30]);
    }
}
