use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::ExecutionId;
use crate::proposal::ProposalId;
use crate::session::{FinalDecision, SessionId};

/// Typed event published through the forge event bus.
///
/// One variant per stable event name; every variant carries the relevant
/// id(s) and a timestamp. For a given proposal, events are emitted in causal
/// order: queued < evaluated < (rejected | started) < (completed | failed <
/// rolled_back).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ForgeEvent {
    ProposalQueued {
        proposal_id: ProposalId,
        at: DateTime<Utc>,
    },
    ProposalEvaluated {
        proposal_id: ProposalId,
        approved: bool,
        overall: f64,
        at: DateTime<Utc>,
    },
    ProposalRejected {
        proposal_id: ProposalId,
        reason: String,
        at: DateTime<Utc>,
    },
    ProposalDeferred {
        proposal_id: ProposalId,
        at: DateTime<Utc>,
    },
    ProposalCancelled {
        proposal_id: ProposalId,
        at: DateTime<Utc>,
    },
    SpecialApprovalRequired {
        proposal_id: ProposalId,
        impact: u8,
        at: DateTime<Utc>,
    },
    ProcessingStarted {
        at: DateTime<Utc>,
    },
    ProcessingCompleted {
        processed: usize,
        at: DateTime<Utc>,
    },
    ConfigUpdated {
        at: DateTime<Utc>,
    },
    ExecutionStarted {
        execution_id: ExecutionId,
        proposal_id: ProposalId,
        at: DateTime<Utc>,
    },
    ExecutionCompleted {
        execution_id: ExecutionId,
        proposal_id: ProposalId,
        at: DateTime<Utc>,
    },
    ExecutionFailed {
        execution_id: ExecutionId,
        proposal_id: ProposalId,
        reason: String,
        at: DateTime<Utc>,
    },
    RollbackSucceeded {
        execution_id: ExecutionId,
        proposal_id: ProposalId,
        at: DateTime<Utc>,
    },
    RollbackFailed {
        execution_id: ExecutionId,
        proposal_id: ProposalId,
        reason: String,
        at: DateTime<Utc>,
    },
    SessionOpened {
        session_id: SessionId,
        proposal_id: ProposalId,
        at: DateTime<Utc>,
    },
    VoteRecorded {
        session_id: SessionId,
        member_id: String,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        session_id: SessionId,
        proposal_id: ProposalId,
        decision: FinalDecision,
        at: DateTime<Utc>,
    },
}

impl ForgeEvent {
    /// Stable event name, usable as a subscription key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProposalQueued { .. } => "proposal_queued",
            Self::ProposalEvaluated { .. } => "proposal_evaluated",
            Self::ProposalRejected { .. } => "proposal_rejected",
            Self::ProposalDeferred { .. } => "proposal_deferred",
            Self::ProposalCancelled { .. } => "proposal_cancelled",
            Self::SpecialApprovalRequired { .. } => "special_approval_required",
            Self::ProcessingStarted { .. } => "processing_started",
            Self::ProcessingCompleted { .. } => "processing_completed",
            Self::ConfigUpdated { .. } => "config_updated",
            Self::ExecutionStarted { .. } => "execution_started",
            Self::ExecutionCompleted { .. } => "execution_completed",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::RollbackSucceeded { .. } => "rollback_succeeded",
            Self::RollbackFailed { .. } => "rollback_failed",
            Self::SessionOpened { .. } => "session_opened",
            Self::VoteRecorded { .. } => "vote_recorded",
            Self::SessionCompleted { .. } => "session_completed",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ProposalQueued { at, .. }
            | Self::ProposalEvaluated { at, .. }
            | Self::ProposalRejected { at, .. }
            | Self::ProposalDeferred { at, .. }
            | Self::ProposalCancelled { at, .. }
            | Self::SpecialApprovalRequired { at, .. }
            | Self::ProcessingStarted { at }
            | Self::ProcessingCompleted { at, .. }
            | Self::ConfigUpdated { at }
            | Self::ExecutionStarted { at, .. }
            | Self::ExecutionCompleted { at, .. }
            | Self::ExecutionFailed { at, .. }
            | Self::RollbackSucceeded { at, .. }
            | Self::RollbackFailed { at, .. }
            | Self::SessionOpened { at, .. }
            | Self::VoteRecorded { at, .. }
            | Self::SessionCompleted { at, .. } => *at,
        }
    }

    /// The proposal this event concerns, when there is one.
    pub fn proposal_id(&self) -> Option<&ProposalId> {
        match self {
            Self::ProposalQueued { proposal_id, .. }
            | Self::ProposalEvaluated { proposal_id, .. }
            | Self::ProposalRejected { proposal_id, .. }
            | Self::ProposalDeferred { proposal_id, .. }
            | Self::ProposalCancelled { proposal_id, .. }
            | Self::SpecialApprovalRequired { proposal_id, .. }
            | Self::ExecutionStarted { proposal_id, .. }
            | Self::ExecutionCompleted { proposal_id, .. }
            | Self::ExecutionFailed { proposal_id, .. }
            | Self::RollbackSucceeded { proposal_id, .. }
            | Self::RollbackFailed { proposal_id, .. }
            | Self::SessionOpened { proposal_id, .. }
            | Self::SessionCompleted { proposal_id, .. } => Some(proposal_id),
            Self::ProcessingStarted { .. }
            | Self::ProcessingCompleted { .. }
            | Self::ConfigUpdated { .. }
            | Self::VoteRecorded { .. } => None,
        }
    }
}

/// Where components publish their events.
///
/// Publishing is synchronous; sinks that fan out to subscribers drop what
/// they cannot deliver, but a sink whose own state is unusable reports it.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ForgeEvent) -> Result<(), crate::error::ForgeError>;
}

/// Sink that discards everything; the default for components wired without
/// an event bus.
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: ForgeEvent) -> Result<(), crate::error::ForgeError> {
        Ok(())
    }
}
