//! Service container for dependency injection.
//!
//! The ServiceContainer builds every component from a `CoreConfig`, hands
//! each one its collaborators explicitly and owns graceful shutdown.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Result;
use crate::billing::{BillingCalculator, BillingSummary};
use crate::catalog::InstanceCatalog;
use crate::config::CoreConfig;
use crate::database::repositories::{
    DeploymentRepository, InMemoryStore, MetricRepository, ServerFilter, ServerRepository,
    SqlxDeploymentRepository, SqlxMetricRepository, SqlxServerRepository,
};
use crate::database::{self, DbPool};
use crate::deployment::DeploymentPipeline;
use crate::events::{BroadcastEventBus, EventEnvelope};
use crate::metrics::MetricsCollector;
use crate::monitoring::MonitoringAggregator;
use crate::runtime::{Clock, RandomSource, SystemClock, ThreadRandom};
use crate::server::ServerLifecycleManager;

/// The three persistence boundaries.
#[derive(Clone)]
pub struct Stores {
    pub servers: Arc<dyn ServerRepository>,
    pub deployments: Arc<dyn DeploymentRepository>,
    pub metrics: Arc<dyn MetricRepository>,
}

impl Stores {
    /// All three backed by one in-memory store.
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            servers: store.clone(),
            deployments: store.clone(),
            metrics: store,
        }
    }

    /// All three backed by SQLite.
    pub fn sqlite(pool: DbPool) -> Self {
        Self {
            servers: Arc::new(SqlxServerRepository::new(pool.clone())),
            deployments: Arc::new(SqlxDeploymentRepository::new(pool.clone())),
            metrics: Arc::new(SqlxMetricRepository::new(pool)),
        }
    }
}

/// Service container holding all hostdeck services.
pub struct ServiceContainer {
    pub config: CoreConfig,
    /// Present when running on SQLite.
    pub pool: Option<DbPool>,
    pub stores: Stores,
    pub catalog: Arc<InstanceCatalog>,
    pub event_bus: BroadcastEventBus,
    pub collector: Arc<MetricsCollector>,
    pub lifecycle: Arc<ServerLifecycleManager>,
    pub pipeline: Arc<DeploymentPipeline>,
    pub monitoring: Arc<MonitoringAggregator>,
    pub billing: BillingCalculator,
    clock: Arc<dyn Clock>,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Build from configuration: SQLite when a database URL is set, otherwise in-memory.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let (pool, stores) = if config.uses_database() {
            let pool = database::init_pool(&config.database_url).await?;
            database::run_migrations(&pool).await?;
            (Some(pool.clone()), Stores::sqlite(pool))
        } else {
            info!("No database configured, using in-memory store");
            (None, Stores::in_memory())
        };

        let mut container = Self::with_stores(
            config,
            stores,
            Arc::new(SystemClock),
            Arc::new(ThreadRandom),
        );
        container.pool = pool;
        Ok(container)
    }

    /// Build over explicit stores, clock and random source.
    pub fn with_stores(
        config: CoreConfig,
        stores: Stores,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        let cancellation_token = CancellationToken::new();
        let catalog = Arc::new(InstanceCatalog::builtin());
        let event_bus = BroadcastEventBus::with_capacity(config.event_capacity);

        let collector = Arc::new(MetricsCollector::new(
            config.collector.clone(),
            stores.metrics.clone(),
            Arc::new(event_bus.clone()),
            clock.clone(),
            random.clone(),
            cancellation_token.child_token(),
        ));

        let lifecycle = Arc::new(ServerLifecycleManager::new(
            config.lifecycle.clone(),
            catalog.clone(),
            stores.servers.clone(),
            stores.metrics.clone(),
            collector.clone(),
            Arc::new(event_bus.clone()),
            clock.clone(),
            random.clone(),
            cancellation_token.child_token(),
        ));

        let pipeline = Arc::new(DeploymentPipeline::new(
            config.pipeline.clone(),
            stores.deployments.clone(),
            lifecycle.clone(),
            Arc::new(event_bus.clone()),
            clock.clone(),
            random,
            cancellation_token.child_token(),
        ));

        let monitoring = Arc::new(MonitoringAggregator::new(
            config.monitoring.clone(),
            stores.servers.clone(),
            stores.metrics.clone(),
            clock.clone(),
        ));

        Self {
            config,
            pool: None,
            stores,
            catalog,
            event_bus,
            collector,
            lifecycle,
            pipeline,
            monitoring,
            billing: BillingCalculator::new(),
            clock,
            cancellation_token,
        }
    }

    /// Restore background work for persisted servers.
    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing services");

        let collecting = self.lifecycle.resume_collection().await?;
        let provisioning = self.lifecycle.resume_provisioning().await?;

        info!(collecting, provisioning, "Services initialized");
        Ok(())
    }

    /// Month-to-date billing for an organization.
    pub async fn billing_summary(&self, organization_id: &str) -> Result<BillingSummary> {
        let servers = self
            .stores
            .servers
            .list_servers(&ServerFilter::for_organization(organization_id))
            .await?;
        Ok(self.billing.calculate(&servers, self.clock.now()))
    }

    /// Stop all background tasks and close the database pool.
    pub async fn shutdown(&self) {
        info!("Shutting down services");

        // Signal all background tasks to stop
        self.cancellation_token.cancel();
        self.collector.stop_all();
        self.lifecycle.shutdown();
        self.pipeline.shutdown();

        if let Some(pool) = &self.pool {
            info!("Closing database pool...");
            pool.close().await;
        }

        info!("Services shut down");
    }

    /// Get the cancellation token for external use.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Subscribe to every published event.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_bus.subscribe()
    }

    /// Get service statistics.
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            active_collectors: self.collector.active_count(),
            event_subscriber_count: self.event_bus.subscriber_count(),
            catalog_entries: self.catalog.len(),
        }
    }
}

/// Service statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStats {
    /// Servers with a running collection task.
    pub active_collectors: usize,
    /// Number of event subscribers.
    pub event_subscriber_count: usize,
    pub catalog_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ManualClock, SeededRandom};
    use crate::server::CreateServerRequest;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_collection() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()));
        let container = ServiceContainer::with_stores(
            CoreConfig::default(),
            Stores::in_memory(),
            clock,
            Arc::new(SeededRandom::new(1)),
        );

        let server = container
            .lifecycle
            .create(CreateServerRequest::new("org-1", "web", "gcp", "e2-micro"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(container.stats().active_collectors, 1);

        let summary = container.billing_summary("org-1").await.unwrap();
        assert_eq!(summary.servers.len(), 1);
        assert_eq!(summary.servers[0].server_id, server.id);

        container.shutdown().await;
        assert!(container.is_shutting_down());
        assert_eq!(container.stats().active_collectors, 0);
    }

    #[tokio::test]
    async fn test_new_without_database_uses_memory() {
        let container = ServiceContainer::new(CoreConfig::default()).await.unwrap();
        assert!(container.pool.is_none());
        assert_eq!(container.stats().catalog_entries, 15);
        container.initialize().await.unwrap();
        container.shutdown().await;
    }
}
