//! Real-time events published by the core.
//!
//! Components never reach for a global emitter: each one receives an
//! `Arc<dyn EventBus>` at construction. The default bus is a tokio broadcast
//! channel that an external transport (websocket, SSE, ...) subscribes to.
//! Delivery is best-effort and at-most-once; publishing never fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::{DeploymentStatus, MetricSample, ServerStatus};

/// Default channel capacity for core events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Per-entity topic an event is published under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Topic {
    Server(String),
    Deployment(String),
}

impl Topic {
    pub fn server(id: impl Into<String>) -> Self {
        Self::Server(id.into())
    }

    pub fn deployment(id: impl Into<String>) -> Self {
        Self::Deployment(id.into())
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server(id) => write!(f, "server:{}", id),
            Self::Deployment(id) => write!(f, "deployment:{}", id),
        }
    }
}

/// Events emitted by the lifecycle manager, collector and pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreEvent {
    /// A server changed status.
    ServerStatusChanged {
        server_id: String,
        status: ServerStatus,
        ip_address: Option<String>,
        generation: u64,
        timestamp: DateTime<Utc>,
    },
    /// A server record was removed.
    ServerDeleted {
        server_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A new metric sample was recorded.
    MetricRecorded { sample: MetricSample },
    /// A deployment changed status.
    DeploymentStatusChanged {
        deployment_id: String,
        server_id: String,
        status: DeploymentStatus,
        timestamp: DateTime<Utc>,
    },
}

impl CoreEvent {
    /// Get a description of the event for logging.
    pub fn description(&self) -> String {
        match self {
            Self::ServerStatusChanged {
                server_id, status, ..
            } => format!("Server {} is now {}", server_id, status),
            Self::ServerDeleted { server_id, .. } => format!("Server {} deleted", server_id),
            Self::MetricRecorded { sample } => {
                format!("Metric sample recorded for server {}", sample.server_id)
            }
            Self::DeploymentStatusChanged {
                deployment_id,
                status,
                ..
            } => format!("Deployment {} is now {}", deployment_id, status),
        }
    }
}

/// A published event together with its topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub topic: Topic,
    pub event: CoreEvent,
}

impl EventEnvelope {
    /// Wire form for an external transport.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Publish side of the event bus.
pub trait EventBus: Send + Sync {
    /// Fire-and-forget publish.
    fn publish(&self, topic: Topic, event: CoreEvent);
}

/// Event bus backed by a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl BroadcastEventBus {
    /// Create a new bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new bus with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to all topics.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, topic: Topic, event: CoreEvent) {
        tracing::trace!(topic = %topic, "Publishing event: {}", event.description());
        // send() returns Err if there are no receivers, which is fine
        let _ = self.sender.send(EventEnvelope { topic, event });
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new()
    }
}
