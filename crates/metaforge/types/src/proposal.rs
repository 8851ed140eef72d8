use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::intent::SculptorIntent;
use crate::session::Urgency;

/// Unique identifier for a blueprint proposal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalId(pub uuid::Uuid);

impl ProposalId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ProposalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bp:{}", self.0)
    }
}

/// System component a proposal targets.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum TargetComponent {
    Memory,
    Agent,
    Protocol,
    Architecture,
    Purpose,
}

impl std::fmt::Display for TargetComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::Agent => "agent",
            Self::Protocol => "protocol",
            Self::Architecture => "architecture",
            Self::Purpose => "purpose",
        };
        write!(f, "{name}")
    }
}

/// Kind of change a proposal requests.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
    Merge,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::Merge => "merge",
        };
        write!(f, "{name}")
    }
}

/// Declared risk grade of a proposal.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum RiskLevel {
    Safe,
    Moderate,
    High,
    Experimental,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Safe => "safe",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Experimental => "experimental",
        };
        write!(f, "{name}")
    }
}

/// How an execution of this proposal is undone.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum RollbackStrategy {
    /// Restore the captured before-state.
    Revert,
    /// Apply compensating actions.
    Compensate,
    /// Adjust the change in place until stable.
    Adapt,
}

/// Ordered rollback contract carried by every proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RollbackPlan {
    pub strategy: RollbackStrategy,
    pub steps: Vec<String>,
}

impl RollbackPlan {
    pub fn revert() -> Self {
        Self {
            strategy: RollbackStrategy::Revert,
            steps: vec!["restore captured before-state".into()],
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.steps.push(step.into());
        self
    }
}

/// One structured change applied to a path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub path: String,
    pub value: serde_json::Value,
}

/// Typed payload of a change specification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SpecPayload {
    /// Memory-component proposals carry the sculpt request itself.
    Sculpt(SculptorIntent),
    /// Multi-path structured change for non-memory components.
    Patch(Vec<PatchOp>),
    /// Free-form document payload.
    Document(serde_json::Value),
    Empty,
}

impl SpecPayload {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Sculpt(intent) => intent.targets.is_empty(),
            Self::Patch(ops) => ops.is_empty(),
            Self::Document(v) => v.is_null(),
            Self::Empty => true,
        }
    }
}

/// What a proposal changes: a path, a typed payload and free metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeSpecification {
    pub path: String,
    pub payload: SpecPayload,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ChangeSpecification {
    pub fn new(path: impl Into<String>, payload: SpecPayload) -> Self {
        Self {
            path: path.into(),
            payload,
            metadata: BTreeMap::new(),
        }
    }

    pub fn sculpt(intent: SculptorIntent) -> Self {
        Self::new("memory/sculpt", SpecPayload::Sculpt(intent))
    }
}

/// A declarative request to modify a system component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlueprintProposal {
    pub id: ProposalId,
    pub created_at: DateTime<Utc>,
    pub proposer: String,
    pub target_component: TargetComponent,
    pub change_type: ChangeType,
    pub specification: ChangeSpecification,
    pub description: String,
    /// Priority in [0, 1].
    pub priority: f64,
    pub risk: RiskLevel,
    /// Alignment with the purpose core, in [0, 1].
    pub purpose_alignment: f64,
    /// Expected emotional impact, in [-1, 1].
    pub expected_impact: f64,
    pub affected_pairs: Vec<(String, String)>,
    pub depends_on: Vec<ProposalId>,
    pub constraints: Vec<String>,
    pub rollback_plan: RollbackPlan,
}

impl BlueprintProposal {
    pub fn builder(
        proposer: impl Into<String>,
        target_component: TargetComponent,
        change_type: ChangeType,
    ) -> ProposalBuilder {
        ProposalBuilder {
            proposer: proposer.into(),
            target_component,
            change_type,
            specification: ChangeSpecification::new("", SpecPayload::Empty),
            description: String::new(),
            priority: 0.5,
            risk: RiskLevel::Moderate,
            purpose_alignment: 0.5,
            expected_impact: 0.0,
            affected_pairs: Vec::new(),
            depends_on: Vec::new(),
            constraints: Vec::new(),
            rollback_plan: RollbackPlan::revert(),
        }
    }

    /// The sculpt request, when this proposal carries one.
    pub fn sculpt_intent(&self) -> Option<&SculptorIntent> {
        match &self.specification.payload {
            SpecPayload::Sculpt(intent) => Some(intent),
            _ => None,
        }
    }

    /// Impact level in 1..=10, used for governance routing.
    ///
    /// Sculpt proposals start from the operation's base; other proposals
    /// start at 5. Target count, declared risk and low purpose alignment
    /// each push the level up.
    pub fn impact_level(&self) -> u8 {
        let (base, target_count) = match self.sculpt_intent() {
            Some(intent) => (intent.operation.kind().impact_base(), intent.targets.len()),
            None => (5, 0),
        };
        let mut level = i32::from(base);
        if target_count > 50 {
            level += 2;
        } else if target_count > 20 {
            level += 1;
        }
        level += match self.risk {
            RiskLevel::Experimental | RiskLevel::High => 2,
            RiskLevel::Moderate => 1,
            RiskLevel::Safe => 0,
        };
        if self.purpose_alignment < 0.5 {
            level += 1;
        }
        level.clamp(1, 10) as u8
    }

    /// Urgency derived from the impact level.
    pub fn urgency(&self) -> Urgency {
        Urgency::from_impact(self.impact_level())
    }
}

/// Builder for [`BlueprintProposal`].
pub struct ProposalBuilder {
    proposer: String,
    target_component: TargetComponent,
    change_type: ChangeType,
    specification: ChangeSpecification,
    description: String,
    priority: f64,
    risk: RiskLevel,
    purpose_alignment: f64,
    expected_impact: f64,
    affected_pairs: Vec<(String, String)>,
    depends_on: Vec<ProposalId>,
    constraints: Vec<String>,
    rollback_plan: RollbackPlan,
}

impl ProposalBuilder {
    pub fn specification(mut self, spec: ChangeSpecification) -> Self {
        self.specification = spec;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = priority.clamp(0.0, 1.0);
        self
    }

    pub fn risk(mut self, risk: RiskLevel) -> Self {
        self.risk = risk;
        self
    }

    pub fn purpose_alignment(mut self, alignment: f64) -> Self {
        self.purpose_alignment = alignment.clamp(0.0, 1.0);
        self
    }

    pub fn expected_impact(mut self, impact: f64) -> Self {
        self.expected_impact = impact.clamp(-1.0, 1.0);
        self
    }

    pub fn affected_pair(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.affected_pairs.push((a.into(), b.into()));
        self
    }

    pub fn depends_on(mut self, id: ProposalId) -> Self {
        self.depends_on.push(id);
        self
    }

    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn rollback_plan(mut self, plan: RollbackPlan) -> Self {
        self.rollback_plan = plan;
        self
    }

    pub fn build(self) -> BlueprintProposal {
        BlueprintProposal {
            id: ProposalId::new(),
            created_at: Utc::now(),
            proposer: self.proposer,
            target_component: self.target_component,
            change_type: self.change_type,
            specification: self.specification,
            description: self.description,
            priority: self.priority,
            risk: self.risk,
            purpose_alignment: self.purpose_alignment,
            expected_impact: self.expected_impact,
            affected_pairs: self.affected_pairs,
            depends_on: self.depends_on,
            constraints: self.constraints,
            rollback_plan: self.rollback_plan,
        }
    }
}

/// Partial proposal used by self-improvement and the reflexive bridge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub target_component: TargetComponent,
    pub change_type: ChangeType,
    pub specification: ChangeSpecification,
    pub description: String,
    pub priority: Option<f64>,
    pub risk: Option<RiskLevel>,
    pub purpose_alignment: Option<f64>,
    pub expected_impact: Option<f64>,
    pub rollback_plan: Option<RollbackPlan>,
}

impl ProposalDraft {
    pub fn into_proposal(self, proposer: impl Into<String>) -> BlueprintProposal {
        let mut builder = BlueprintProposal::builder(
            proposer,
            self.target_component,
            self.change_type,
        )
        .specification(self.specification)
        .description(self.description);
        if let Some(priority) = self.priority {
            builder = builder.priority(priority);
        }
        if let Some(risk) = self.risk {
            builder = builder.risk(risk);
        }
        if let Some(alignment) = self.purpose_alignment {
            builder = builder.purpose_alignment(alignment);
        }
        if let Some(impact) = self.expected_impact {
            builder = builder.expected_impact(impact);
        }
        if let Some(plan) = self.rollback_plan {
            builder = builder.rollback_plan(plan);
        }
        builder.build()
    }
}
