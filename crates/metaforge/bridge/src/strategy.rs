//! Proposal strategies: how a detector candidate becomes a full proposal.

use metaforge_types::{
    BlueprintProposal, ChangeSpecification, ChangeType, OperationKind, RiskLevel, RollbackPlan,
    SculptorIntent, TargetComponent,
};

use crate::detectors::OpportunityCandidate;

/// Policy for filling in the fields a detector does not decide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposalStrategy {
    /// Low priority, cautious risk grades, verbose rollback.
    Conservative,
    /// Pushes candidates harder: higher priority, leaner rollback.
    Aggressive,
    /// Conservative below a confidence bar, aggressive above it.
    Adaptive,
}

impl ProposalStrategy {
    fn effective(&self, confidence: f64) -> ProposalStrategy {
        match self {
            Self::Adaptive => {
                if confidence >= 0.7 {
                    Self::Aggressive
                } else {
                    Self::Conservative
                }
            }
            other => *other,
        }
    }

    /// Build the proposal for a candidate, on behalf of the bridge.
    pub fn shape(&self, candidate: OpportunityCandidate) -> BlueprintProposal {
        let effective = self.effective(candidate.confidence);
        let kind = candidate.operation.kind();
        let destructive = matches!(kind, OperationKind::Merge | OperationKind::Prune);

        let (priority, risk, rollback) = match effective {
            ProposalStrategy::Conservative => (
                0.3 + 0.3 * candidate.confidence,
                if destructive {
                    RiskLevel::Moderate
                } else {
                    RiskLevel::Safe
                },
                RollbackPlan::revert()
                    .with_step("verify restored records match captured state")
                    .with_step("requeue the opportunity for review"),
            ),
            ProposalStrategy::Aggressive => (
                0.5 + 0.5 * candidate.confidence,
                if kind == OperationKind::Prune {
                    RiskLevel::Moderate
                } else {
                    RiskLevel::Safe
                },
                RollbackPlan::revert(),
            ),
            ProposalStrategy::Adaptive => unreachable!("resolved above"),
        };

        let change_type = match kind {
            OperationKind::Merge => ChangeType::Merge,
            OperationKind::Prune => ChangeType::Delete,
            _ => ChangeType::Modify,
        };

        let intent = SculptorIntent::new(
            candidate.agent_id.clone(),
            candidate.targets,
            candidate.operation,
        )
        .with_reason(candidate.reasoning.clone());

        BlueprintProposal::builder("reflexive-bridge", TargetComponent::Memory, change_type)
            .specification(ChangeSpecification::sculpt(intent))
            .description(candidate.reasoning)
            .priority(priority)
            .risk(risk)
            .purpose_alignment((0.7 + 0.2 * candidate.confidence).min(0.9))
            .expected_impact(if destructive { 0.0 } else { 0.3 })
            .rollback_plan(rollback)
            .build()
    }
}
