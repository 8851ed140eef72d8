#![deny(unsafe_code)]
//! Proposal evaluation: a pure, deterministic scoring of a blueprint
//! proposal against a purpose core.
//!
//! Four axes with fixed weights (purpose 0.4, feasibility 0.3, risk 0.2,
//! resonance 0.1) combine into an overall score; approval additionally
//! requires the purpose and risk axes to clear their own floors.

use std::collections::BTreeSet;

use chrono::Utc;

use metaforge_types::{
    AxisScores, BlueprintProposal, ChangeType, EvaluationResult, PurposeCore, RiskLevel,
    RollbackStrategy, TargetComponent,
};

/// Thresholds and weights for the evaluator. The defaults are the scoring
/// contract; overriding them is a test-and-tuning seam.
#[derive(Clone, Debug)]
pub struct EvaluatorConfig {
    /// Minimum overall score for approval.
    pub approval_threshold: f64,
    /// Floor on the purpose axis.
    pub min_purpose_score: f64,
    /// Floor on the risk axis.
    pub min_risk_score: f64,
    pub purpose_weight: f64,
    pub feasibility_weight: f64,
    pub risk_weight: f64,
    pub resonance_weight: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            approval_threshold: 0.7,
            min_purpose_score: 0.6,
            min_risk_score: 0.5,
            purpose_weight: 0.4,
            feasibility_weight: 0.3,
            risk_weight: 0.2,
            resonance_weight: 0.1,
        }
    }
}

/// Scores proposals. Stateless; history is owned by the engine.
#[derive(Clone, Debug, Default)]
pub struct ProposalEvaluator {
    config: EvaluatorConfig,
}

impl ProposalEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Score `proposal` against `purpose`. Pure: fixed inputs always yield
    /// an identical result apart from the evaluation timestamp.
    pub fn evaluate(
        &self,
        proposal: &BlueprintProposal,
        purpose: &PurposeCore,
    ) -> EvaluationResult {
        let axes = AxisScores {
            purpose: self.purpose_score(proposal, purpose),
            feasibility: self.feasibility_score(proposal),
            risk: self.risk_score(proposal),
            resonance: self.resonance_score(proposal),
        };

        let overall = (self.config.purpose_weight * axes.purpose
            + self.config.feasibility_weight * axes.feasibility
            + self.config.risk_weight * axes.risk
            + self.config.resonance_weight * axes.resonance)
            .clamp(0.0, 1.0);

        let approved = overall >= self.config.approval_threshold
            && axes.purpose >= self.config.min_purpose_score
            && axes.risk >= self.config.min_risk_score;

        let explanation = format!(
            "purpose={:.3} feasibility={:.3} risk={:.3} resonance={:.3} overall={:.3} -> {}",
            axes.purpose,
            axes.feasibility,
            axes.risk,
            axes.resonance,
            overall,
            if approved { "approved" } else { "not approved" },
        );

        EvaluationResult {
            proposal_id: proposal.id.clone(),
            approved,
            overall,
            axes,
            explanation,
            recommendations: self.recommendations(proposal, &axes),
            evaluated_at: Utc::now(),
        }
    }

    fn purpose_score(&self, proposal: &BlueprintProposal, purpose: &PurposeCore) -> f64 {
        let mut score = proposal.purpose_alignment;
        if proposal.target_component == TargetComponent::Purpose
            && proposal.change_type == ChangeType::Modify
        {
            // Hard penalty: rewriting the purpose is presumed misaligned.
            score *= 0.1;
        }
        score += keyword_overlap_credit(&proposal.description, purpose);
        score.clamp(0.0, 1.0)
    }

    fn feasibility_score(&self, proposal: &BlueprintProposal) -> f64 {
        let mut score: f64 = 0.8;
        score *= match proposal.change_type {
            ChangeType::Add => 0.9,
            ChangeType::Modify => 0.8,
            ChangeType::Delete => 0.7,
            ChangeType::Merge => 0.6,
        };
        score *= match proposal.target_component {
            TargetComponent::Memory => 0.9,
            TargetComponent::Agent => 0.8,
            TargetComponent::Protocol => 0.7,
            TargetComponent::Architecture => 0.6,
            TargetComponent::Purpose => 0.5,
        };
        if proposal.depends_on.len() > 3 {
            score *= 0.8;
        }
        if proposal.specification.path.is_empty() || proposal.specification.payload.is_empty() {
            score *= 0.5;
        }
        score.clamp(0.0, 1.0)
    }

    fn risk_score(&self, proposal: &BlueprintProposal) -> f64 {
        let base = match proposal.risk {
            RiskLevel::Safe => 0.9,
            RiskLevel::Moderate => 0.7,
            RiskLevel::High => 0.4,
            RiskLevel::Experimental => 0.2,
        };
        let quality = rollback_quality(proposal);
        let mut score = base * 0.7 + quality * 0.3;
        score -= (proposal.depends_on.len() as f64 * 0.05).min(0.3);
        score.clamp(0.0, 1.0)
    }

    fn resonance_score(&self, proposal: &BlueprintProposal) -> f64 {
        ((proposal.expected_impact + 1.0) / 2.0).clamp(0.0, 1.0)
    }

    fn recommendations(&self, proposal: &BlueprintProposal, axes: &AxisScores) -> Vec<String> {
        let mut out = Vec::new();
        if proposal.target_component == TargetComponent::Purpose
            && proposal.change_type == ChangeType::Modify
        {
            out.push("purpose modifications carry a hard penalty; reconsider the target".into());
        }
        if axes.purpose < self.config.min_purpose_score {
            out.push("increase purpose alignment or narrow the change".into());
        }
        if axes.feasibility < 0.5 {
            out.push("reduce the change surface or split the proposal".into());
        }
        if proposal.depends_on.len() > 3 {
            out.push("reduce the dependency count".into());
        }
        if axes.risk < self.config.min_risk_score {
            out.push("strengthen the rollback plan or lower the declared risk".into());
        }
        if proposal.rollback_plan.steps.is_empty() {
            out.push("add explicit rollback steps".into());
        }
        if axes.resonance < 0.4 {
            out.push("expected impact is negative; mitigate the affected relationships".into());
        }
        out
    }
}

/// Capped credit for purpose-keyword overlap in the description.
fn keyword_overlap_credit(description: &str, purpose: &PurposeCore) -> f64 {
    let keywords: BTreeSet<String> = purpose
        .mission
        .split_whitespace()
        .chain(purpose.values.iter().flat_map(|v| v.split_whitespace()))
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 3)
        .collect();
    if keywords.is_empty() {
        return 0.0;
    }
    let overlap: BTreeSet<String> = description
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| keywords.contains(w))
        .collect();
    (overlap.len() as f64 * 0.05).min(0.15)
}

/// Rollback-plan quality: strategy weight plus a step-count bonus, capped.
fn rollback_quality(proposal: &BlueprintProposal) -> f64 {
    let strategy_weight = match proposal.rollback_plan.strategy {
        RollbackStrategy::Revert => 0.6,
        RollbackStrategy::Compensate => 0.45,
        RollbackStrategy::Adapt => 0.3,
    };
    let step_bonus = (proposal.rollback_plan.steps.len() as f64 * 0.1).min(0.4);
    (strategy_weight + step_bonus).min(1.0)
}
