//! Metrics collector and its task registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::SampleGenerator;
use crate::config::CollectorConfig;
use crate::database::repositories::MetricRepository;
use crate::domain::MetricSample;
use crate::events::{CoreEvent, EventBus, Topic};
use crate::runtime::{Clock, RandomSource};
use crate::scheduler::{TaskKind, TaskRegistry};
use crate::{Error, Result};

/// Periodic per-server metric sampler.
///
/// At most one collection task exists per server id; starting collection for
/// a server that already has one replaces it.
pub struct MetricsCollector {
    config: CollectorConfig,
    generator: SampleGenerator,
    metrics: Arc<dyn MetricRepository>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    registry: TaskRegistry,
}

impl MetricsCollector {
    pub fn new(
        config: CollectorConfig,
        metrics: Arc<dyn MetricRepository>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            generator: SampleGenerator::default(),
            metrics,
            events,
            clock,
            random,
            registry: TaskRegistry::new(TaskKind::Collection, cancellation_token),
        }
    }

    /// Replace the value ranges used for synthetic samples.
    pub fn with_generator(mut self, generator: SampleGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Start collecting for `server_id` at the configured interval.
    pub fn start_for(self: &Arc<Self>, server_id: &str) {
        self.start_collection(server_id, self.config.interval);
    }

    /// Start collecting for `server_id`, cancelling any existing task first.
    pub fn start_collection(self: &Arc<Self>, server_id: &str, interval: Duration) {
        let this = Arc::clone(self);
        let id = server_id.to_string();
        self.registry
            .spawn(server_id, move |token| async move { this.run(id, interval, token).await });
        info!(server_id = %server_id, interval_ms = interval.as_millis() as u64, "Metrics collection started");
    }

    pub fn stop_for(&self, server_id: &str) {
        self.stop_collection(server_id);
    }

    /// Stop collecting for `server_id`. No-op when nothing is running.
    pub fn stop_collection(&self, server_id: &str) {
        if self.registry.cancel(server_id) {
            info!(server_id = %server_id, "Metrics collection stopped");
        }
    }

    /// Stop collecting for `server_id` and wait for an in-flight tick to finish.
    ///
    /// After this returns no further sample for the server will be written.
    pub async fn stop_and_wait(&self, server_id: &str) {
        if self.registry.cancel_and_wait(server_id).await {
            info!(server_id = %server_id, "Metrics collection stopped");
        }
    }

    pub fn is_active(&self, server_id: &str) -> bool {
        self.registry.is_active(server_id)
    }

    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Stop every collection task.
    pub fn stop_all(&self) {
        self.registry.cancel_all();
    }

    /// Generate and record one sample for `server_id`.
    pub async fn collect_once(&self, server_id: &str) -> Result<MetricSample> {
        let sample = self
            .generator
            .generate(server_id, self.clock.now(), self.random.as_ref());
        self.record_sample(&sample)
            .await
            .map_err(|e| Error::sampling(server_id, e))?;
        Ok(sample)
    }

    /// Append a sample, publish it and enforce retention.
    pub async fn record_sample(&self, sample: &MetricSample) -> Result<()> {
        self.metrics.insert_metric(sample).await?;
        self.events.publish(
            Topic::server(&sample.server_id),
            CoreEvent::MetricRecorded {
                sample: sample.clone(),
            },
        );

        let pruned = self
            .metrics
            .prune_metrics(&sample.server_id, self.config.retention)
            .await?;
        if pruned > 0 {
            trace!(server_id = %sample.server_id, pruned, "Pruned old metric samples");
        }
        Ok(())
    }

    async fn run(&self, server_id: String, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // A started tick always finishes: insert, publish and prune go together.
            match self.collect_once(&server_id).await {
                Ok(sample) => trace!(
                    server_id = %server_id,
                    cpu = sample.cpu_usage,
                    memory = sample.memory_usage,
                    disk = sample.disk_usage,
                    "Metric sample recorded"
                ),
                Err(e) => warn!(server_id = %server_id, error = %e, "Metric sampling failed"),
            }
        }

        debug!(server_id = %server_id, "Collection task exited");
    }
}
