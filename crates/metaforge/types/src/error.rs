use thiserror::Error;

use crate::proposal::ProposalId;
use crate::record::RecordId;
use crate::result::SculptFailure;

/// Errors surfaced by the forge pipeline.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// A sculpt intent failed validation and was never started.
    #[error("invalid intent: {0}")]
    InvalidIntent(String),

    /// A proposal failed validation and was never queued.
    #[error("invalid proposal: {0}")]
    InvalidProposal(String),

    /// A required record, proposal or session does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Deleting these targets would violate their protection.
    #[error("operation would delete {} protected record(s)", .0.len())]
    ProtectedTargets(Vec<RecordId>),

    /// A pre-hook vetoed the operation.
    #[error("hook '{hook_id}' vetoed: {reason}")]
    HookVetoed { hook_id: String, reason: String },

    /// The proposal was not approved for execution.
    #[error("proposal {0} is not approved for execution")]
    NotApproved(ProposalId),

    /// The executor's active set is full.
    #[error("concurrency limit reached: {active} active execution(s)")]
    ConcurrencyLimitReached { active: usize },

    /// A rollback could not restore the pre-execution state.
    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    /// An opportunity detector failed.
    #[error("detector error: {0}")]
    DetectorError(String),

    /// The memory store rejected an operation.
    #[error("store error: {0}")]
    StoreError(String),

    /// A shared-state lock was poisoned by a panicking holder.
    #[error("lock error")]
    LockError,
}

impl From<SculptFailure> for ForgeError {
    fn from(failure: SculptFailure) -> Self {
        match failure {
            SculptFailure::ProtectedTargets { ids } => Self::ProtectedTargets(ids),
            SculptFailure::HookVetoed { hook_id, reason } => Self::HookVetoed { hook_id, reason },
            SculptFailure::Store { message } => Self::StoreError(message),
            SculptFailure::Invalid { message } => Self::InvalidIntent(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = ForgeError::InvalidProposal("missing specification path".into());
        assert_eq!(
            err.to_string(),
            "invalid proposal: missing specification path"
        );

        let err = ForgeError::ProtectedTargets(vec![RecordId::new()]);
        assert_eq!(
            err.to_string(),
            "operation would delete 1 protected record(s)"
        );

        let err = ForgeError::ConcurrencyLimitReached { active: 3 };
        assert_eq!(
            err.to_string(),
            "concurrency limit reached: 3 active execution(s)"
        );

        assert_eq!(ForgeError::LockError.to_string(), "lock error");
    }

    #[test]
    fn sculpt_failure_conversion() {
        let err: ForgeError = SculptFailure::HookVetoed {
            hook_id: "guard".into(),
            reason: "protected scope".into(),
        }
        .into();
        assert!(matches!(err, ForgeError::HookVetoed { .. }));
    }
}
