//! Server entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ServerStatus;
use crate::Error;
use crate::domain::{InstanceSpec, Provider};

/// A hosted server owned by an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub provider: Provider,
    pub instance_type: String,
    pub region: String,
    /// Catalog entry snapshotted at creation.
    pub spec: InstanceSpec,
    pub status: ServerStatus,
    /// Assigned once provisioning succeeds.
    pub ip_address: Option<String>,
    pub failure_reason: Option<String>,
    /// Bumped on every status transition; delayed completions compare against it.
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Server {
    /// Create a new server in `pending`.
    pub fn new(
        organization_id: impl Into<String>,
        name: impl Into<String>,
        provider: Provider,
        instance_type: impl Into<String>,
        spec: InstanceSpec,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.into(),
            name: name.into(),
            provider,
            instance_type: instance_type.into(),
            region: provider.default_region().to_string(),
            spec,
            status: ServerStatus::Pending,
            ip_address: None,
            failure_reason: None,
            generation: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Validate and apply a status transition.
    pub fn transition(&mut self, target: ServerStatus, now: DateTime<Utc>) -> Result<(), Error> {
        self.status = self.status.transition_to(target)?;
        self.generation += 1;
        self.updated_at = now;
        Ok(())
    }

    /// Provisioning finished: assign the address and go `running`.
    pub fn mark_provisioned(&mut self, ip_address: impl Into<String>, now: DateTime<Utc>) -> Result<(), Error> {
        self.transition(ServerStatus::Running, now)?;
        self.ip_address = Some(ip_address.into());
        self.failure_reason = None;
        Ok(())
    }

    /// Provisioning failed.
    pub fn mark_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), Error> {
        self.transition(ServerStatus::Failed, now)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    pub fn monthly_price(&self) -> f64 {
        self.spec.monthly_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_server() -> Server {
        Server::new(
            "org-1",
            "web-1",
            Provider::Aws,
            "t3.micro",
            InstanceSpec::new(2, 1, 8, 1.0, 7.59),
            Utc::now(),
        )
    }

    #[test]
    fn test_new_server() {
        let server = create_test_server();
        assert_eq!(server.status, ServerStatus::Pending);
        assert_eq!(server.generation, 0);
        assert_eq!(server.region, "us-east-1");
        assert!(server.ip_address.is_none());
    }

    #[test]
    fn test_mark_provisioned() {
        let mut server = create_test_server();
        server.mark_provisioned("203.0.113.7", Utc::now()).unwrap();
        assert_eq!(server.status, ServerStatus::Running);
        assert_eq!(server.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(server.generation, 1);
    }

    #[test]
    fn test_rejected_transition_leaves_server_untouched() {
        let mut server = create_test_server();
        server.mark_provisioned("203.0.113.7", Utc::now()).unwrap();
        let before = server.clone();

        let result = server.transition(ServerStatus::Running, Utc::now());
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        assert_eq!(server, before);
    }

    #[test]
    fn test_mark_failed() {
        let mut server = create_test_server();
        server.mark_failed("capacity unavailable", Utc::now()).unwrap();
        assert_eq!(server.status, ServerStatus::Failed);
        assert_eq!(server.failure_reason.as_deref(), Some("capacity unavailable"));
        assert!(server.mark_provisioned("203.0.113.7", Utc::now()).is_err());
    }
}
