//! Deployment state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Deployment pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    #[default]
    Pending,
    Building,
    Deployed,
    Failed,
}

impl DeploymentStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "building" => Some(Self::Building),
            "deployed" => Some(Self::Deployed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Deployed | Self::Failed)
    }

    /// Validate a forward pipeline transition.
    ///
    /// Redeploys bypass this and always re-enter `building`.
    pub fn can_transition_to(&self, target: DeploymentStatus) -> bool {
        use DeploymentStatus::*;

        matches!(
            (self, target),
            (Pending, Building) | (Building, Deployed) | (Building, Failed)
        )
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&self, target: DeploymentStatus) -> Result<DeploymentStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::invalid_transition(self, target))
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
