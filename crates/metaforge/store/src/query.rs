use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use metaforge_types::MemoryRecord;

/// Typed predicate over memory records.
///
/// All populated clauses must hold for a record to match; an empty query
/// matches everything owned by the agent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    /// Match records carrying at least one of these tags.
    pub any_tags: BTreeSet<String>,
    /// Match records carrying all of these tags.
    pub all_tags: BTreeSet<String>,
    /// Match records whose text content contains this substring.
    pub content_contains: Option<String>,
    /// Match records older than this instant.
    pub before: Option<DateTime<Utc>>,
    /// Match records newer than this instant.
    pub after: Option<DateTime<Utc>>,
    /// Match only protected (`Some(true)`) or unprotected (`Some(false)`)
    /// records.
    pub protected: Option<bool>,
}

impl RecordQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_any_tag(mut self, tag: impl Into<String>) -> Self {
        self.any_tags.insert(tag.into());
        self
    }

    pub fn with_all_tag(mut self, tag: impl Into<String>) -> Self {
        self.all_tags.insert(tag.into());
        self
    }

    pub fn with_content(mut self, needle: impl Into<String>) -> Self {
        self.content_contains = Some(needle.into());
        self
    }

    pub fn older_than(mut self, instant: DateTime<Utc>) -> Self {
        self.before = Some(instant);
        self
    }

    pub fn newer_than(mut self, instant: DateTime<Utc>) -> Self {
        self.after = Some(instant);
        self
    }

    pub fn protected_only(mut self, protected: bool) -> Self {
        self.protected = Some(protected);
        self
    }

    /// Whether `record` satisfies every populated clause at `now`.
    pub fn matches(&self, record: &MemoryRecord, now: DateTime<Utc>) -> bool {
        if !self.any_tags.is_empty() && self.any_tags.is_disjoint(&record.tags) {
            return false;
        }
        if !self.all_tags.is_subset(&record.tags) {
            return false;
        }
        if let Some(needle) = &self.content_contains {
            match record.content.as_text() {
                Some(text) if text.contains(needle.as_str()) => {}
                _ => return false,
            }
        }
        if let Some(before) = self.before {
            if record.timestamp >= before {
                return false;
            }
        }
        if let Some(after) = self.after {
            if record.timestamp <= after {
                return false;
            }
        }
        if let Some(protected) = self.protected {
            if record.is_protected_at(now) != protected {
                return false;
            }
        }
        true
    }
}
