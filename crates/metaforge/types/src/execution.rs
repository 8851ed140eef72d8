use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::proposal::ProposalId;

/// Unique identifier for a forge execution.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionId(pub uuid::Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exec:{}", self.0)
    }
}

/// Lifecycle of an execution: pending → running → (success | failed), and
/// failed → rolled_back when the rollback plan reverses cleanly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    RolledBack,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::RolledBack)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        };
        write!(f, "{name}")
    }
}

/// One applied change: the path it touched and the value before and after.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub path: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

/// Outcome of driving a rollback plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RollbackAttempt {
    pub succeeded: bool,
    pub detail: String,
    pub completed_at: DateTime<Utc>,
}

/// Record of one execution of an approved proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForgeExecution {
    pub id: ExecutionId,
    pub proposal_id: ProposalId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    /// Append-only trace of what the executor did.
    pub log: Vec<String>,
    pub changes: Vec<ChangeRecord>,
    pub rollback: Option<RollbackAttempt>,
}

impl ForgeExecution {
    pub fn new(proposal_id: ProposalId) -> Self {
        Self {
            id: ExecutionId::new(),
            proposal_id,
            started_at: Utc::now(),
            completed_at: None,
            status: ExecutionStatus::Pending,
            log: Vec::new(),
            changes: Vec::new(),
            rollback: None,
        }
    }

    pub fn log_line(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
    }
}
