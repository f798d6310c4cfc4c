//! Deployment entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeploymentStatus;
use crate::Error;

/// A simulated build-and-deploy run against a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub server_id: String,
    pub organization_id: String,
    pub name: String,
    pub repository_url: Option<String>,
    pub branch: String,
    pub status: DeploymentStatus,
    /// Append-only narrative, one `[timestamp] message` line per entry.
    pub build_log: String,
    /// Bumped on every status change and redeploy.
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// Create a new deployment in `pending`.
    pub fn new(
        server_id: impl Into<String>,
        organization_id: impl Into<String>,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            server_id: server_id.into(),
            organization_id: organization_id.into(),
            name: name.into(),
            repository_url: None,
            branch: "main".to_string(),
            status: DeploymentStatus::Pending,
            build_log: String::new(),
            generation: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the source repository.
    pub fn with_source(mut self, repository_url: Option<String>, branch: Option<String>) -> Self {
        self.repository_url = repository_url;
        if let Some(branch) = branch {
            self.branch = branch;
        }
        self
    }

    /// Append a log entry.
    pub fn append_log(&mut self, message: &str, now: DateTime<Utc>) {
        self.build_log
            .push_str(&format!("[{}] {}\n", now.to_rfc3339(), message));
        self.updated_at = now;
    }

    /// Move from `pending` to `building`.
    pub fn start_build(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        self.status = self.status.transition_to(DeploymentStatus::Building)?;
        self.generation += 1;
        self.append_log(&format!("Build started for {} ({})", self.name, self.branch), now);
        Ok(())
    }

    /// Resolve a build to `deployed` or `failed`.
    pub fn finish(&mut self, succeeded: bool, now: DateTime<Utc>) -> Result<(), Error> {
        let target = if succeeded {
            DeploymentStatus::Deployed
        } else {
            DeploymentStatus::Failed
        };
        self.status = self.status.transition_to(target)?;
        self.generation += 1;
        if succeeded {
            self.append_log("Deployment completed successfully", now);
        } else {
            self.append_log("Deployment failed: build step exited with errors", now);
        }
        Ok(())
    }

    /// Re-enter `building` regardless of the current status.
    pub fn restart_build(&mut self, now: DateTime<Utc>) {
        self.status = DeploymentStatus::Building;
        self.generation += 1;
        self.append_log(&format!("Redeploy started for {} ({})", self.name, self.branch), now);
    }

    pub fn log_lines(&self) -> impl Iterator<Item = &str> {
        self.build_log.lines()
    }
}
