use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::record::RecordId;
use crate::result::ImpactMetrics;

/// The six typed mutations the sculptor can apply.
///
/// Each variant statically enumerates its own parameter set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SculptOperation {
    /// Rewrite tags and/or merge metadata on each target.
    Relabel {
        new_tags: Option<BTreeSet<String>>,
        new_metadata: Option<BTreeMap<String, serde_json::Value>>,
        /// When set, the tag set becomes exactly `new_tags`; otherwise the
        /// union of existing and new tags.
        replace_tags: bool,
    },
    /// Combine two or more targets into a fresh record.
    Merge {
        /// Sources are deleted after the merge unless explicitly retained.
        delete_originals: bool,
    },
    /// Delete each target.
    Prune {
        /// When set, any currently protected target aborts the whole
        /// operation.
        respect_protection: bool,
    },
    /// Add links from each target to the given records.
    Relink {
        link_to_ids: Vec<RecordId>,
        link_metadata: Option<BTreeMap<String, serde_json::Value>>,
    },
    /// Copy a window around the first occurrence of a pattern out of each
    /// target into a new record. Sources are unchanged.
    Extract { pattern: String },
    /// Mark each target protected, optionally until `now + duration_secs`.
    Preserve {
        duration_secs: Option<i64>,
        reason: Option<String>,
    },
}

impl SculptOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Relabel { .. } => OperationKind::Relabel,
            Self::Merge { .. } => OperationKind::Merge,
            Self::Prune { .. } => OperationKind::Prune,
            Self::Relink { .. } => OperationKind::Relink,
            Self::Extract { .. } => OperationKind::Extract,
            Self::Preserve { .. } => OperationKind::Preserve,
        }
    }

    /// Prune with protection checks enabled.
    pub fn prune() -> Self {
        Self::Prune {
            respect_protection: true,
        }
    }

    /// Merge that deletes its sources.
    pub fn merge() -> Self {
        Self::Merge {
            delete_originals: true,
        }
    }
}

/// Discriminant of a [`SculptOperation`], used for routing and hook filters.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum OperationKind {
    Relabel,
    Merge,
    Prune,
    Relink,
    Extract,
    Preserve,
}

impl OperationKind {
    /// Impact metrics recorded on a successful sculpt of this kind.
    pub fn impact(&self) -> ImpactMetrics {
        match self {
            Self::Relabel => ImpactMetrics::new(3, 2, 1),
            Self::Merge => ImpactMetrics::new(7, 8, 0),
            Self::Prune => ImpactMetrics::new(8, 6, -1),
            Self::Relink => ImpactMetrics::new(5, 7, 0),
            Self::Extract => ImpactMetrics::new(4, 5, 0),
            Self::Preserve => ImpactMetrics::new(2, 1, 3),
        }
    }

    /// Base impact level used when routing proposals to governance.
    pub fn impact_base(&self) -> u8 {
        match self {
            Self::Relabel => 2,
            Self::Merge => 8,
            Self::Prune => 9,
            Self::Relink => 6,
            Self::Extract => 4,
            Self::Preserve => 3,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Relabel => "relabel",
            Self::Merge => "merge",
            Self::Prune => "prune",
            Self::Relink => "relink",
            Self::Extract => "extract",
            Self::Preserve => "preserve",
        };
        write!(f, "{name}")
    }
}

/// A request to apply one sculpt operation to a set of target records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SculptorIntent {
    /// Agent on whose behalf the operation runs.
    pub agent_id: String,
    /// Non-empty set of target record ids.
    pub targets: Vec<RecordId>,
    pub operation: SculptOperation,
    pub reason: Option<String>,
    /// Tags attached to records the operation creates.
    pub tags: BTreeSet<String>,
}

impl SculptorIntent {
    pub fn new(
        agent_id: impl Into<String>,
        targets: Vec<RecordId>,
        operation: SculptOperation,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            targets,
            operation,
            reason: None,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}
