//! Core error types.

use thiserror::Error;

/// Core result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type.
///
/// Every variant is scoped to a single server or deployment; none of them is
/// fatal to the process.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown instance type: {instance_type} for provider {provider}")]
    UnknownInstanceType {
        provider: String,
        instance_type: String,
    },

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Server {server_id} is not running (status: {status})")]
    ServerNotReady { server_id: String, status: String },

    #[error("Provisioning failed for server {server_id}: {reason}")]
    ProvisioningFailed { server_id: String, reason: String },

    #[error("Sampling failed for server {server_id}: {reason}")]
    SamplingError { server_id: String, reason: String },

    #[error("Stale completion for {entity_type} {id} (scheduled at generation {scheduled}, now {current})")]
    StaleCompletion {
        entity_type: String,
        id: String,
        scheduled: u64,
        current: u64,
    },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn sampling(server_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::SamplingError {
            server_id: server_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn stale(entity_type: impl Into<String>, id: impl Into<String>, scheduled: u64, current: u64) -> Self {
        Self::StaleCompletion {
            entity_type: entity_type.into(),
            id: id.into(),
            scheduled,
            current,
        }
    }

    /// Whether this error is a rejected caller request rather than an internal failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnknownInstanceType { .. }
                | Self::InvalidTransition { .. }
                | Self::ServerNotReady { .. }
                | Self::NotFound { .. }
                | Self::Validation(_)
        )
    }
}
