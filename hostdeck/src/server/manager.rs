//! Server lifecycle manager implementation.
//!
//! The ServerLifecycleManager is the only writer of server records. Every
//! status change goes through a per-server lock, is persisted before any side
//! effect runs, and is announced on the server's topic.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::InstanceCatalog;
use crate::config::LifecycleConfig;
use crate::database::repositories::{MetricRepository, ServerFilter, ServerRepository};
use crate::domain::{Provider, Server, ServerStatus};
use crate::events::{CoreEvent, EventBus, Topic};
use crate::metrics::MetricsCollector;
use crate::runtime::{Clock, RandomSource, synthetic_ipv4};
use crate::scheduler::{TaskKind, TaskRegistry};
use crate::utils::KeyedLocks;
use crate::{Error, Result};

/// Reason recorded on servers whose simulated provisioning fails.
const PROVISIONING_FAILURE_REASON: &str = "provider reported insufficient capacity";

/// Input for [`ServerLifecycleManager::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateServerRequest {
    pub organization_id: String,
    pub name: String,
    pub provider: String,
    pub instance_type: String,
    #[serde(default)]
    pub region: Option<String>,
}

impl CreateServerRequest {
    pub fn new(
        organization_id: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        instance_type: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            name: name.into(),
            provider: provider.into(),
            instance_type: instance_type.into(),
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// A server seen in `running`. Its transitions wait until this is dropped.
pub struct RunningServer {
    pub server: Server,
    _guard: OwnedMutexGuard<()>,
}

/// Owns server status transitions and their side effects.
pub struct ServerLifecycleManager {
    config: LifecycleConfig,
    catalog: Arc<InstanceCatalog>,
    servers: Arc<dyn ServerRepository>,
    metrics: Arc<dyn MetricRepository>,
    collector: Arc<MetricsCollector>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    provisioning: TaskRegistry,
    locks: KeyedLocks,
}

impl ServerLifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: LifecycleConfig,
        catalog: Arc<InstanceCatalog>,
        servers: Arc<dyn ServerRepository>,
        metrics: Arc<dyn MetricRepository>,
        collector: Arc<MetricsCollector>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            catalog,
            servers,
            metrics,
            collector,
            events,
            clock,
            random,
            provisioning: TaskRegistry::new(TaskKind::Provisioning, cancellation_token),
            locks: KeyedLocks::new(),
        }
    }

    // ========== Transitions ==========

    /// Create a server in `pending` and schedule its provisioning.
    ///
    /// Returns as soon as the record is persisted.
    pub async fn create(self: &Arc<Self>, request: CreateServerRequest) -> Result<Server> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(Error::validation("server name must not be empty"));
        }
        if request.organization_id.trim().is_empty() {
            return Err(Error::validation("organization id must not be empty"));
        }

        let provider = Provider::parse(&request.provider).ok_or_else(|| Error::UnknownInstanceType {
            provider: request.provider.clone(),
            instance_type: request.instance_type.clone(),
        })?;
        let spec = self.catalog.resolve_for(provider, &request.instance_type)?;

        let mut server = Server::new(
            request.organization_id,
            name,
            provider,
            request.instance_type,
            spec,
            self.clock.now(),
        );
        if let Some(region) = request.region.filter(|r| !r.trim().is_empty()) {
            server = server.with_region(region);
        }

        self.servers.create_server(&server).await?;
        self.publish_status(&server);
        info!(
            server_id = %server.id,
            provider = %server.provider,
            instance_type = %server.instance_type,
            "Server created, provisioning scheduled"
        );

        self.schedule_provisioning(&server);
        Ok(server)
    }

    /// `stopped -> running`; restarts metric collection.
    pub async fn start(&self, id: &str) -> Result<Server> {
        let _guard = self.locks.lock(id).await;
        let mut server = self.servers.get_server(id).await?;
        if server.status != ServerStatus::Stopped {
            return Err(Error::invalid_transition(server.status, ServerStatus::Running));
        }

        server.transition(ServerStatus::Running, self.clock.now())?;
        self.servers.update_server(&server).await?;
        self.collector.start_for(id);
        self.publish_status(&server);
        info!(server_id = %id, generation = server.generation, "Server started");
        Ok(server)
    }

    /// `running -> stopped`; stops metric collection.
    pub async fn stop(&self, id: &str) -> Result<Server> {
        let _guard = self.locks.lock(id).await;
        let mut server = self.servers.get_server(id).await?;
        if server.status != ServerStatus::Running {
            return Err(Error::invalid_transition(server.status, ServerStatus::Stopped));
        }

        server.transition(ServerStatus::Stopped, self.clock.now())?;
        self.servers.update_server(&server).await?;
        self.collector.stop_for(id);
        self.publish_status(&server);
        info!(server_id = %id, generation = server.generation, "Server stopped");
        Ok(server)
    }

    /// Any non-terminated status `-> terminated`.
    ///
    /// Cancels pending provisioning and stops collection. Samples are kept.
    pub async fn terminate(&self, id: &str) -> Result<Server> {
        let _guard = self.locks.lock(id).await;
        let mut server = self.servers.get_server(id).await?;

        server.transition(ServerStatus::Terminated, self.clock.now())?;
        self.servers.update_server(&server).await?;
        self.provisioning.cancel(id);
        self.collector.stop_for(id);
        self.publish_status(&server);
        info!(server_id = %id, generation = server.generation, "Server terminated");
        Ok(server)
    }

    /// Remove a server with its samples, in any status.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let guard = self.locks.lock(id).await;
        // Fail with NotFound before touching anything.
        self.servers.get_server(id).await?;

        self.provisioning.cancel(id);
        // A tick already writing must land before the samples are removed.
        self.collector.stop_and_wait(id).await;
        let removed = self.metrics.delete_metrics_for_server(id).await?;
        self.servers.delete_server(id).await?;

        self.events.publish(
            Topic::server(id),
            CoreEvent::ServerDeleted {
                server_id: id.to_string(),
                timestamp: self.clock.now(),
            },
        );
        drop(guard);
        self.locks.forget(id);

        info!(server_id = %id, samples_removed = removed, "Server deleted");
        Ok(())
    }

    // ========== Provisioning ==========

    fn schedule_provisioning(self: &Arc<Self>, server: &Server) {
        let this = Arc::clone(self);
        let id = server.id.clone();
        let generation = server.generation;

        self.provisioning
            .schedule(&server.id, self.config.provisioning_delay, async move {
                match this.complete_provisioning(&id, generation).await {
                    Ok(_) => {}
                    Err(e @ (Error::StaleCompletion { .. } | Error::NotFound { .. })) => {
                        debug!(server_id = %id, "Discarding provisioning completion: {}", e);
                    }
                    Err(e) => {
                        warn!(server_id = %id, error = %e, "Provisioning completion failed");
                    }
                }
            });
    }

    /// Resolve provisioning for a server scheduled at `scheduled_generation`.
    ///
    /// Fails with `StaleCompletion` if the server has transitioned since.
    pub async fn complete_provisioning(&self, id: &str, scheduled_generation: u64) -> Result<Server> {
        let _guard = self.locks.lock(id).await;
        let mut server = self.servers.get_server(id).await?;
        if server.generation != scheduled_generation || server.status != ServerStatus::Pending {
            return Err(Error::stale("Server", id, scheduled_generation, server.generation));
        }

        let now = self.clock.now();
        if self.random.chance(self.config.provisioning_failure_rate) {
            server.mark_failed(PROVISIONING_FAILURE_REASON, now)?;
            self.servers.update_server(&server).await?;
            self.publish_status(&server);

            let err = Error::ProvisioningFailed {
                server_id: id.to_string(),
                reason: PROVISIONING_FAILURE_REASON.to_string(),
            };
            warn!(server_id = %id, "{}", err);
            return Ok(server);
        }

        let ip = synthetic_ipv4(self.random.as_ref());
        server.mark_provisioned(ip.to_string(), now)?;
        self.servers.update_server(&server).await?;
        self.collector.start_for(id);
        self.publish_status(&server);
        info!(server_id = %id, ip_address = %ip, "Server provisioned");
        Ok(server)
    }

    // ========== Queries ==========

    pub async fn get(&self, id: &str) -> Result<Server> {
        self.servers.get_server(id).await
    }

    pub async fn list(&self, filter: &ServerFilter) -> Result<Vec<Server>> {
        self.servers.list_servers(filter).await
    }

    pub async fn status(&self, id: &str) -> Result<ServerStatus> {
        Ok(self.servers.get_server(id).await?.status)
    }

    /// Lock the server and check that it is `running`.
    ///
    /// The returned guard keeps `stop`, `terminate` and `delete` waiting, so
    /// callers can persist work that depends on the server staying up.
    pub async fn hold_running(&self, id: &str) -> Result<RunningServer> {
        let guard = self.locks.lock(id).await;
        let server = self.servers.get_server(id).await?;
        if server.status != ServerStatus::Running {
            return Err(Error::ServerNotReady {
                server_id: server.id,
                status: server.status.to_string(),
            });
        }
        Ok(RunningServer {
            server,
            _guard: guard,
        })
    }

    pub fn is_collecting(&self, id: &str) -> bool {
        self.collector.is_active(id)
    }

    pub fn is_provisioning(&self, id: &str) -> bool {
        self.provisioning.is_active(id)
    }

    pub fn catalog(&self) -> &InstanceCatalog {
        &self.catalog
    }

    // ========== Startup / shutdown ==========

    /// Start collectors for every persisted `running` server.
    pub async fn resume_collection(&self) -> Result<usize> {
        let running = self
            .servers
            .list_servers(&ServerFilter::default().with_status(ServerStatus::Running))
            .await?;
        for server in &running {
            self.collector.start_for(&server.id);
        }
        info!("Resumed metrics collection for {} servers", running.len());
        Ok(running.len())
    }

    /// Reschedule provisioning for servers persisted in `pending`.
    pub async fn resume_provisioning(self: &Arc<Self>) -> Result<usize> {
        let pending = self
            .servers
            .list_servers(&ServerFilter::default().with_status(ServerStatus::Pending))
            .await?;
        for server in &pending {
            self.schedule_provisioning(server);
        }
        if !pending.is_empty() {
            info!("Rescheduled provisioning for {} servers", pending.len());
        }
        Ok(pending.len())
    }

    /// Cancel all provisioning tasks.
    pub fn shutdown(&self) {
        self.provisioning.cancel_all();
    }

    fn publish_status(&self, server: &Server) {
        self.events.publish(
            Topic::server(&server.id),
            CoreEvent::ServerStatusChanged {
                server_id: server.id.clone(),
                status: server.status,
                ip_address: server.ip_address.clone(),
                generation: server.generation,
                timestamp: server.updated_at,
            },
        );
    }
}
