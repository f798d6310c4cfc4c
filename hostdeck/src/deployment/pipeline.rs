//! Deployment pipeline implementation.
//!
//! A deployment moves `pending -> building -> deployed | failed` through two
//! delayed stages. Each stage captures the deployment's generation when it is
//! scheduled and is discarded if the generation has moved on by the time it
//! fires (a redeploy, or the record was deleted).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::database::repositories::DeploymentRepository;
use crate::domain::{Deployment, DeploymentStatus};
use crate::events::{CoreEvent, EventBus, Topic};
use crate::runtime::{Clock, RandomSource};
use crate::scheduler::{TaskKind, TaskRegistry};
use crate::server::ServerLifecycleManager;
use crate::utils::KeyedLocks;
use crate::{Error, Result};

/// Input for [`DeploymentPipeline::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDeploymentRequest {
    pub server_id: String,
    pub name: String,
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
}

impl CreateDeploymentRequest {
    pub fn new(server_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            name: name.into(),
            repository_url: None,
            branch: None,
        }
    }

    pub fn with_source(mut self, repository_url: impl Into<String>, branch: impl Into<String>) -> Self {
        self.repository_url = Some(repository_url.into());
        self.branch = Some(branch.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Build,
    Resolve,
}

/// Runs simulated deployments against running servers.
pub struct DeploymentPipeline {
    config: PipelineConfig,
    deployments: Arc<dyn DeploymentRepository>,
    lifecycle: Arc<ServerLifecycleManager>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    stages: TaskRegistry,
    locks: KeyedLocks,
}

impl DeploymentPipeline {
    pub fn new(
        config: PipelineConfig,
        deployments: Arc<dyn DeploymentRepository>,
        lifecycle: Arc<ServerLifecycleManager>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            deployments,
            lifecycle,
            events,
            clock,
            random,
            stages: TaskRegistry::new(TaskKind::DeploymentStage, cancellation_token),
            locks: KeyedLocks::new(),
        }
    }

    /// Create a deployment for a running server and schedule its build.
    pub async fn create(self: &Arc<Self>, request: CreateDeploymentRequest) -> Result<Deployment> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(Error::validation("deployment name must not be empty"));
        }
        // Held until the record is stored so the server cannot stop in between.
        let running = self.lifecycle.hold_running(&request.server_id).await?;
        let server = &running.server;

        let deployment = Deployment::new(&server.id, &server.organization_id, name, self.clock.now())
            .with_source(request.repository_url, request.branch);
        self.deployments.create_deployment(&deployment).await?;
        drop(running);
        self.publish_status(&deployment);
        info!(
            deployment_id = %deployment.id,
            server_id = %deployment.server_id,
            "Deployment created"
        );

        self.schedule(&deployment, Stage::Build, self.config.build_delay);
        Ok(deployment)
    }

    /// Rebuild an existing deployment. Any stage still pending is superseded.
    pub async fn redeploy(self: &Arc<Self>, id: &str) -> Result<Deployment> {
        let _guard = self.locks.lock(id).await;
        let mut deployment = self.deployments.get_deployment(id).await?;
        let running = self.lifecycle.hold_running(&deployment.server_id).await?;

        deployment.restart_build(self.clock.now());
        self.deployments.update_deployment(&deployment).await?;
        drop(running);
        self.publish_status(&deployment);
        info!(deployment_id = %id, generation = deployment.generation, "Redeploy started");

        self.schedule(&deployment, Stage::Resolve, self.config.deploy_delay);
        Ok(deployment)
    }

    /// Remove a deployment, cancelling pending stages.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let guard = self.locks.lock(id).await;
        self.deployments.get_deployment(id).await?;
        self.stages.cancel(id);
        self.deployments.delete_deployment(id).await?;
        drop(guard);
        self.locks.forget(id);
        info!(deployment_id = %id, "Deployment deleted");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Deployment> {
        self.deployments.get_deployment(id).await
    }

    /// Deployments of a server, newest first.
    pub async fn list_for_server(&self, server_id: &str) -> Result<Vec<Deployment>> {
        self.deployments.list_deployments_for_server(server_id).await
    }

    pub fn has_pending_stage(&self, id: &str) -> bool {
        self.stages.is_active(id)
    }

    /// Draw a build outcome: `true` with the configured success probability.
    pub fn resolve_outcome(&self) -> bool {
        self.random.chance(self.config.success_probability)
    }

    /// Cancel all pending stages.
    pub fn shutdown(&self) {
        self.stages.cancel_all();
    }

    // ========== Stages ==========

    fn schedule(self: &Arc<Self>, deployment: &Deployment, stage: Stage, delay: Duration) {
        let this = Arc::clone(self);
        let id = deployment.id.clone();
        let generation = deployment.generation;

        self.stages.schedule(&deployment.id, delay, async move {
            let result = match stage {
                Stage::Build => this.complete_build(&id, generation).await,
                Stage::Resolve => this.complete_resolve(&id, generation).await,
            };
            match result {
                Ok(_) => {}
                Err(e @ (Error::StaleCompletion { .. } | Error::NotFound { .. })) => {
                    debug!(deployment_id = %id, stage = ?stage, "Discarding stage completion: {}", e);
                }
                Err(e) => warn!(deployment_id = %id, stage = ?stage, error = %e, "Deployment stage failed"),
            }
        });
    }

    /// `pending -> building`, then schedule resolution.
    async fn complete_build(self: &Arc<Self>, id: &str, scheduled_generation: u64) -> Result<Deployment> {
        let _guard = self.locks.lock(id).await;
        let mut deployment = self.current(id, scheduled_generation).await?;

        deployment.start_build(self.clock.now())?;
        self.deployments.update_deployment(&deployment).await?;
        self.publish_status(&deployment);
        debug!(deployment_id = %id, "Build started");

        self.schedule(&deployment, Stage::Resolve, self.config.deploy_delay);
        Ok(deployment)
    }

    /// `building -> deployed | failed`.
    pub async fn complete_resolve(&self, id: &str, scheduled_generation: u64) -> Result<Deployment> {
        let _guard = self.locks.lock(id).await;
        let mut deployment = self.current(id, scheduled_generation).await?;
        if deployment.status != DeploymentStatus::Building {
            return Err(Error::invalid_transition(deployment.status, DeploymentStatus::Deployed));
        }

        let succeeded = self.resolve_outcome();
        deployment.finish(succeeded, self.clock.now())?;
        self.deployments.update_deployment(&deployment).await?;
        self.publish_status(&deployment);
        info!(deployment_id = %id, status = %deployment.status, "Deployment finished");
        Ok(deployment)
    }

    /// Load a deployment and check that no newer stage has superseded `scheduled_generation`.
    async fn current(&self, id: &str, scheduled_generation: u64) -> Result<Deployment> {
        let deployment = self
            .deployments
            .find_deployment(id)
            .await?
            .ok_or_else(|| Error::not_found("Deployment", id))?;
        if deployment.generation != scheduled_generation {
            return Err(Error::stale("Deployment", id, scheduled_generation, deployment.generation));
        }
        Ok(deployment)
    }

    fn publish_status(&self, deployment: &Deployment) {
        self.events.publish(
            Topic::deployment(&deployment.id),
            CoreEvent::DeploymentStatusChanged {
                deployment_id: deployment.id.clone(),
                server_id: deployment.server_id.clone(),
                status: deployment.status,
                timestamp: deployment.updated_at,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InstanceCatalog;
    use crate::config::{CollectorConfig, LifecycleConfig};
    use crate::database::repositories::InMemoryStore;
    use crate::domain::{Server, ServerStatus};
    use crate::events::BroadcastEventBus;
    use crate::metrics::MetricsCollector;
    use crate::runtime::{FixedRandom, SeededRandom, SystemClock};
    use crate::server::CreateServerRequest;

    struct Harness {
        pipeline: Arc<DeploymentPipeline>,
        lifecycle: Arc<ServerLifecycleManager>,
        server: Server,
    }

    /// Pipeline over a server that is already running.
    async fn harness(pipeline_random: Arc<dyn RandomSource>) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(BroadcastEventBus::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let random: Arc<dyn RandomSource> = Arc::new(SeededRandom::new(9));
        let token = CancellationToken::new();

        let collector = Arc::new(MetricsCollector::new(
            CollectorConfig {
                interval: Duration::from_secs(3600),
                retention: 10,
            },
            store.clone(),
            bus.clone(),
            clock.clone(),
            random.clone(),
            token.child_token(),
        ));
        let lifecycle = Arc::new(ServerLifecycleManager::new(
            LifecycleConfig {
                provisioning_delay: Duration::from_secs(1),
                provisioning_failure_rate: 0.0,
            },
            Arc::new(InstanceCatalog::builtin()),
            store.clone(),
            store.clone(),
            collector,
            bus.clone(),
            clock.clone(),
            random,
            token.child_token(),
        ));
        let pipeline = Arc::new(DeploymentPipeline::new(
            PipelineConfig {
                build_delay: Duration::from_secs(2),
                deploy_delay: Duration::from_secs(5),
                success_probability: 0.8,
            },
            store,
            lifecycle.clone(),
            bus,
            clock,
            pipeline_random,
            token.child_token(),
        ));

        let server = lifecycle
            .create(CreateServerRequest::new("org-1", "api-1", "digitalocean", "s-1vcpu-1gb"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        let server = lifecycle.get(&server.id).await.unwrap();
        assert_eq!(server.status, ServerStatus::Running);

        Harness {
            pipeline,
            lifecycle,
            server,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_deployment() {
        let h = harness(Arc::new(FixedRandom(0.0))).await;
        let deployment = h
            .pipeline
            .create(CreateDeploymentRequest::new(&h.server.id, "api").with_source("https://git.example.com/api.git", "release"))
            .await
            .unwrap();
        assert_eq!(deployment.status, DeploymentStatus::Pending);
        assert_eq!(deployment.organization_id, "org-1");

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(
            h.pipeline.get(&deployment.id).await.unwrap().status,
            DeploymentStatus::Building
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        let deployment = h.pipeline.get(&deployment.id).await.unwrap();
        assert_eq!(deployment.status, DeploymentStatus::Deployed);
        let lines: Vec<_> = deployment.log_lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("api (release)"));
        assert!(lines[1].ends_with("Deployment completed successfully"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_deployment() {
        let h = harness(Arc::new(FixedRandom(0.99))).await;
        let deployment = h
            .pipeline
            .create(CreateDeploymentRequest::new(&h.server.id, "api"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(8)).await;
        let deployment = h.pipeline.get(&deployment.id).await.unwrap();
        assert_eq!(deployment.status, DeploymentStatus::Failed);
        assert!(deployment.build_log.contains("Deployment failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_requires_running_server() {
        let h = harness(Arc::new(FixedRandom(0.0))).await;
        h.lifecycle.stop(&h.server.id).await.unwrap();

        let result = h
            .pipeline
            .create(CreateDeploymentRequest::new(&h.server.id, "api"))
            .await;
        assert!(matches!(result, Err(Error::ServerNotReady { .. })));
        assert!(h.pipeline.list_for_server(&h.server.id).await.unwrap().is_empty());

        let result = h
            .pipeline
            .create(CreateDeploymentRequest::new("missing", "api"))
            .await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_redeploy_supersedes_pending_stage() {
        let h = harness(Arc::new(FixedRandom(0.0))).await;
        let deployment = h
            .pipeline
            .create(CreateDeploymentRequest::new(&h.server.id, "api"))
            .await
            .unwrap();

        // Building, with resolution due at t=7s.
        tokio::time::sleep(Duration::from_secs(4)).await;
        let redeployed = h.pipeline.redeploy(&deployment.id).await.unwrap();
        assert_eq!(redeployed.status, DeploymentStatus::Building);
        assert_eq!(redeployed.generation, 2);

        // The superseded stage would have fired here.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(
            h.pipeline.get(&deployment.id).await.unwrap().status,
            DeploymentStatus::Building
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        let deployment = h.pipeline.get(&deployment.id).await.unwrap();
        assert_eq!(deployment.status, DeploymentStatus::Deployed);
        assert_eq!(deployment.generation, 3);
        let terminal = deployment
            .log_lines()
            .filter(|line| line.ends_with("Deployment completed successfully"))
            .count();
        assert_eq!(terminal, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redeploy_after_finish_and_on_stopped_server() {
        let h = harness(Arc::new(FixedRandom(0.0))).await;
        let deployment = h
            .pipeline
            .create(CreateDeploymentRequest::new(&h.server.id, "api"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(8)).await;

        h.pipeline.redeploy(&deployment.id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        let finished = h.pipeline.get(&deployment.id).await.unwrap();
        assert_eq!(finished.status, DeploymentStatus::Deployed);
        assert_eq!(finished.log_lines().count(), 4);

        h.lifecycle.stop(&h.server.id).await.unwrap();
        assert!(matches!(
            h.pipeline.redeploy(&deployment.id).await,
            Err(Error::ServerNotReady { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_stage_completion() {
        let h = harness(Arc::new(FixedRandom(0.0))).await;
        let deployment = h
            .pipeline
            .create(CreateDeploymentRequest::new(&h.server.id, "api"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let result = h.pipeline.complete_resolve(&deployment.id, 0).await;
        assert!(matches!(result, Err(Error::StaleCompletion { .. })));
        assert_eq!(
            h.pipeline.get(&deployment.id).await.unwrap().status,
            DeploymentStatus::Building
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_cancels_stages() {
        let h = harness(Arc::new(FixedRandom(0.0))).await;
        let deployment = h
            .pipeline
            .create(CreateDeploymentRequest::new(&h.server.id, "api"))
            .await
            .unwrap();
        assert!(h.pipeline.has_pending_stage(&deployment.id));

        h.pipeline.delete(&deployment.id).await.unwrap();
        assert!(!h.pipeline.has_pending_stage(&deployment.id));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(matches!(
            h.pipeline.get(&deployment.id).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcome_distribution() {
        let h = harness(Arc::new(SeededRandom::new(2024))).await;
        let draws = 10_000;
        let successes = (0..draws).filter(|_| h.pipeline.resolve_outcome()).count();
        let fraction = successes as f64 / draws as f64;
        assert!((fraction - 0.8).abs() <= 0.02, "fraction was {}", fraction);
    }
}
