//! Server state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Server lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// Created, waiting for provisioning to finish.
    #[default]
    Pending,
    /// Provisioned and serving.
    Running,
    /// Stopped by the owner; can be started again.
    Stopped,
    /// Provisioning failed.
    Failed,
    /// Permanently released.
    Terminated,
}

impl ServerStatus {
    pub const ALL: [ServerStatus; 5] = [
        Self::Pending,
        Self::Running,
        Self::Stopped,
        Self::Failed,
        Self::Terminated,
    ];

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "stopped" => Some(Self::Stopped),
            "failed" => Some(Self::Failed),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Whether the server accrues cost in the current billing period.
    pub fn is_billable(&self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Stopped)
    }

    /// Validate a state transition.
    ///
    /// Same-state transitions are rejected: starting a running server or
    /// stopping a stopped one is a caller error.
    pub fn can_transition_to(&self, target: ServerStatus) -> bool {
        use ServerStatus::*;

        match (self, target) {
            (Pending, Running | Failed) => true,
            (Running, Stopped) => true,
            (Stopped, Running) => true,
            (from, Terminated) => !from.is_terminated(),
            _ => false,
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&self, target: ServerStatus) -> Result<ServerStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::invalid_transition(self, target))
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
