use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::proposal::BlueprintProposal;

/// Unique identifier for a voting session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gov:{}", self.0)
    }
}

/// Lifecycle of a voting session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Expired,
}

/// A member's position on a proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteChoice {
    Approve,
    Reject,
    Abstain,
}

/// How quickly a session must resolve; scales the voting deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    /// Multiplier applied to the base voting time limit.
    pub fn deadline_factor(&self) -> f64 {
        match self {
            Self::Critical => 0.5,
            Self::High => 0.75,
            Self::Medium => 1.0,
            Self::Low => 1.5,
        }
    }

    /// Urgency implied by an impact level in 1..=10.
    pub fn from_impact(impact: u8) -> Self {
        match impact {
            9..=10 => Self::Critical,
            7..=8 => Self::High,
            5..=6 => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Terminal outcome of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalDecision {
    Approved,
    Rejected,
    Deferred,
}

impl std::fmt::Display for FinalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Deferred => "deferred",
        };
        write!(f, "{name}")
    }
}

/// One cast vote. A member's latest vote supersedes earlier ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub member_id: String,
    pub choice: VoteChoice,
    /// Voter confidence in [0, 1].
    pub confidence: f64,
    /// Non-negative voting weight.
    pub weight: f64,
    pub cast_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(
        member_id: impl Into<String>,
        choice: VoteChoice,
        confidence: f64,
        weight: f64,
    ) -> Self {
        Self {
            member_id: member_id.into(),
            choice,
            confidence: confidence.clamp(0.0, 1.0),
            weight: weight.max(0.0),
            cast_at: Utc::now(),
        }
    }
}

/// Weighted vote totals for a session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    pub approve_weight: f64,
    pub reject_weight: f64,
    pub abstain_weight: f64,
    pub votes_cast: usize,
}

impl VoteTally {
    /// Weight cast on either decisive side.
    fn decisive_weight(&self) -> f64 {
        self.approve_weight + self.reject_weight
    }

    /// Weighted approval fraction over non-abstain weight.
    pub fn weighted_approval(&self) -> f64 {
        let total = self.decisive_weight();
        if total <= 0.0 {
            0.0
        } else {
            self.approve_weight / total
        }
    }

    /// Weighted rejection fraction over non-abstain weight.
    pub fn weighted_rejection(&self) -> f64 {
        let total = self.decisive_weight();
        if total <= 0.0 {
            0.0
        } else {
            self.reject_weight / total
        }
    }
}

/// A time-bounded weighted vote over one proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VotingSession {
    pub id: SessionId,
    /// Snapshot of the proposal under review.
    pub proposal: BlueprintProposal,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub votes: Vec<Vote>,
    /// Minimum number of cast votes before the session may resolve
    /// non-trivially.
    pub quorum: usize,
    /// Weighted fraction required on one side, in [0, 1].
    pub consensus_threshold: f64,
    pub urgency: Urgency,
    pub deadline: DateTime<Utc>,
    pub decision: Option<FinalDecision>,
}

impl VotingSession {
    pub fn new(
        proposal: BlueprintProposal,
        quorum: usize,
        consensus_threshold: f64,
        urgency: Urgency,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            proposal,
            created_at: Utc::now(),
            completed_at: None,
            status: SessionStatus::InProgress,
            votes: Vec::new(),
            quorum,
            consensus_threshold: consensus_threshold.clamp(0.0, 1.0),
            urgency,
            deadline,
            decision: None,
        }
    }

    /// Record a vote; a later vote from the same member supersedes.
    pub fn record_vote(&mut self, vote: Vote) {
        if let Some(existing) = self
            .votes
            .iter_mut()
            .find(|v| v.member_id == vote.member_id)
        {
            *existing = vote;
        } else {
            self.votes.push(vote);
        }
    }

    pub fn tally(&self) -> VoteTally {
        let mut tally = VoteTally {
            approve_weight: 0.0,
            reject_weight: 0.0,
            abstain_weight: 0.0,
            votes_cast: self.votes.len(),
        };
        for vote in &self.votes {
            match vote.choice {
                VoteChoice::Approve => tally.approve_weight += vote.weight,
                VoteChoice::Reject => tally.reject_weight += vote.weight,
                VoteChoice::Abstain => tally.abstain_weight += vote.weight,
            }
        }
        tally
    }

    pub fn quorum_met(&self) -> bool {
        self.votes.len() >= self.quorum
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}
