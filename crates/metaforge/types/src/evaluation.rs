use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::proposal::ProposalId;

/// Read-only purpose statement consumed by the evaluator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PurposeCore {
    pub mission: String,
    pub values: Vec<String>,
    pub constraints: Vec<String>,
}

impl PurposeCore {
    pub fn new(mission: impl Into<String>) -> Self {
        Self {
            mission: mission.into(),
            values: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }
}

/// Per-axis sub-scores, each in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisScores {
    pub purpose: f64,
    pub feasibility: f64,
    pub risk: f64,
    pub resonance: f64,
}

/// Outcome of scoring one proposal. Pure function of proposal and purpose
/// core; append-only in the engine's history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub proposal_id: ProposalId,
    pub approved: bool,
    /// Weighted overall score in [0, 1].
    pub overall: f64,
    pub axes: AxisScores,
    pub explanation: String,
    pub recommendations: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}
