use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::intent::OperationKind;
use crate::proposal::{ChangeType, TargetComponent};

/// Configuration surface shared by the engine, executor, sculptor,
/// governance controller and reflexive bridge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Minimum overall score for auto-execution without governance.
    pub auto_approval_threshold: f64,
    /// Change types that always require a governance session.
    pub requires_guild_consensus: BTreeSet<ChangeType>,
    /// Upper bound on concurrently running executions.
    pub max_concurrent_executions: usize,
    /// Dry-run the change against a scratch store before live mutation.
    pub sandbox_first: bool,
    /// Reject modifications to the purpose component outright.
    pub purpose_lock_enabled: bool,
    /// Target components that always require a governance session.
    pub human_oversight_required: BTreeSet<TargetComponent>,
    /// Impact level (1..=10) at or above which governance is required.
    pub impact_threshold: u8,
    /// Sculpt operations that always require a governance session.
    pub always_require_reflection: BTreeSet<OperationKind>,
    /// Floor for the per-session quorum.
    pub min_quorum: usize,
    /// Weighted fraction required to resolve a session, in [0, 1].
    pub consensus_threshold: f64,
    /// Base voting window in seconds, scaled by urgency.
    pub voting_time_limit_secs: i64,
    /// Upper bound on targets per sculpt operation.
    pub max_memories_per_operation: usize,
    /// Per-agent suppression window for bridge proposals, in seconds.
    pub proposal_cooldown_secs: i64,
    /// Age in seconds after which an untouched record becomes a prune
    /// candidate.
    pub prune_age_threshold_secs: i64,
    /// Shared-tag count at which a new record suggests a merge.
    pub merge_threshold: usize,
    /// Query-hit count at which a record suggests preservation.
    pub preserve_relevance_threshold: usize,
    /// Estimated risk-axis score at or above which a bridge candidate is
    /// shaped for the auto-approval path.
    pub auto_approval_risk_threshold: f64,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            auto_approval_threshold: 0.7,
            requires_guild_consensus: [ChangeType::Merge, ChangeType::Delete]
                .into_iter()
                .collect(),
            max_concurrent_executions: 3,
            sandbox_first: false,
            purpose_lock_enabled: true,
            human_oversight_required: [TargetComponent::Purpose, TargetComponent::Architecture]
                .into_iter()
                .collect(),
            impact_threshold: 7,
            always_require_reflection: [OperationKind::Prune, OperationKind::Merge]
                .into_iter()
                .collect(),
            min_quorum: 3,
            consensus_threshold: 0.67,
            voting_time_limit_secs: 300,
            max_memories_per_operation: 50,
            proposal_cooldown_secs: 60,
            prune_age_threshold_secs: 60 * 60 * 24 * 30,
            merge_threshold: 3,
            preserve_relevance_threshold: 5,
            auto_approval_risk_threshold: 0.7,
        }
    }
}

impl ForgeConfig {
    pub fn voting_time_limit(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.voting_time_limit_secs)
    }

    pub fn proposal_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.proposal_cooldown_secs)
    }

    pub fn prune_age_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.prune_age_threshold_secs)
    }
}
