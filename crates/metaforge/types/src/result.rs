use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::intent::SculptorIntent;
use crate::record::{MemoryRecord, RecordId};

/// Before/after snapshot of one modified record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordDelta {
    pub before: MemoryRecord,
    pub after: MemoryRecord,
}

/// Impact of a sculpt operation.
///
/// Cognitive impact is 1..=10, structural 0..=10, emotional -5..=5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactMetrics {
    pub cognitive: u8,
    pub structural: u8,
    pub emotional: i8,
}

impl ImpactMetrics {
    pub const fn new(cognitive: u8, structural: u8, emotional: i8) -> Self {
        Self {
            cognitive,
            structural,
            emotional,
        }
    }

    /// Minimal impact, recorded on failed operations.
    pub const fn minimal() -> Self {
        Self::new(1, 0, 0)
    }
}

/// Why a sculpt operation failed.
///
/// A serializable mirror of the failure cases that can occur after
/// validation, carried inside [`SculptorResult`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SculptFailure {
    /// Deleting these targets would violate their protection.
    ProtectedTargets { ids: Vec<RecordId> },
    /// A pre-hook vetoed the operation.
    HookVetoed { hook_id: String, reason: String },
    /// The store rejected an operation mid-transaction.
    Store { message: String },
    /// The operation's parameters were unusable for a target.
    Invalid { message: String },
}

impl std::fmt::Display for SculptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProtectedTargets { ids } => {
                write!(f, "{} protected target(s) cannot be deleted", ids.len())
            }
            Self::HookVetoed { hook_id, reason } => {
                write!(f, "hook '{hook_id}' vetoed: {reason}")
            }
            Self::Store { message } => write!(f, "store error: {message}"),
            Self::Invalid { message } => write!(f, "invalid operation: {message}"),
        }
    }
}

/// Immutable outcome of one sculpt call.
///
/// `affected_ids` lists every record id the operation touched, whether
/// modified, created or deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SculptorResult {
    pub intent: SculptorIntent,
    pub success: bool,
    pub modified: Vec<RecordDelta>,
    pub created: Vec<MemoryRecord>,
    pub deleted: Vec<RecordId>,
    pub affected_ids: Vec<RecordId>,
    pub impact: ImpactMetrics,
    pub error: Option<SculptFailure>,
    pub completed_at: DateTime<Utc>,
}

impl SculptorResult {
    /// A successful result; `affected_ids` is derived from the touched sets.
    pub fn succeeded(
        intent: SculptorIntent,
        modified: Vec<RecordDelta>,
        created: Vec<MemoryRecord>,
        deleted: Vec<RecordId>,
    ) -> Self {
        let mut affected_ids: Vec<RecordId> = modified
            .iter()
            .map(|d| d.before.id.clone())
            .chain(created.iter().map(|r| r.id.clone()))
            .chain(deleted.iter().cloned())
            .collect();
        affected_ids.sort();
        affected_ids.dedup();
        let impact = intent.operation.kind().impact();
        Self {
            intent,
            success: true,
            modified,
            created,
            deleted,
            affected_ids,
            impact,
            error: None,
            completed_at: Utc::now(),
        }
    }

    /// A failed result with zero surviving mutations.
    pub fn failed(intent: SculptorIntent, failure: SculptFailure) -> Self {
        Self {
            intent,
            success: false,
            modified: Vec::new(),
            created: Vec::new(),
            deleted: Vec::new(),
            affected_ids: Vec::new(),
            impact: ImpactMetrics::minimal(),
            error: Some(failure),
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::SculptOperation;
    use crate::record::RecordContent;

    fn sample_intent(targets: Vec<RecordId>) -> SculptorIntent {
        SculptorIntent::new(
            "agent-1",
            targets,
            SculptOperation::Relabel {
                new_tags: None,
                new_metadata: None,
                replace_tags: false,
            },
        )
    }

    #[test]
    fn affected_ids_cover_all_touched_records() {
        let r1 = MemoryRecord::new("agent-1", RecordContent::Text("a".into()));
        let r2 = MemoryRecord::new("agent-1", RecordContent::Text("b".into()));
        let deleted = RecordId::new();
        let delta = RecordDelta {
            before: r1.clone(),
            after: r1.clone(),
        };
        let result = SculptorResult::succeeded(
            sample_intent(vec![r1.id.clone()]),
            vec![delta],
            vec![r2.clone()],
            vec![deleted.clone()],
        );
        assert!(result.affected_ids.contains(&r1.id));
        assert!(result.affected_ids.contains(&r2.id));
        assert!(result.affected_ids.contains(&deleted));
        assert_eq!(result.affected_ids.len(), 3);
    }

    #[test]
    fn failed_result_has_no_mutations() {
        let result = SculptorResult::failed(
            sample_intent(vec![RecordId::new()]),
            SculptFailure::Invalid {
                message: "missing parameters".into(),
            },
        );
        assert!(!result.success);
        assert!(result.modified.is_empty());
        assert!(result.created.is_empty());
        assert!(result.deleted.is_empty());
        assert!(result.affected_ids.is_empty());
        assert_eq!(result.impact, ImpactMetrics::minimal());
    }

    #[test]
    fn failure_display() {
        let failure = SculptFailure::ProtectedTargets {
            ids: vec![RecordId::new(), RecordId::new()],
        };
        assert_eq!(
            failure.to_string(),
            "2 protected target(s) cannot be deleted"
        );
    }
}
