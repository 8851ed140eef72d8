use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a memory record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub uuid::Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rec:{}", self.0)
    }
}

/// Well-known metadata keys carried by memory records.
pub mod meta {
    pub const PROTECTED: &str = "protected";
    pub const PROTECTION_EXPIRES_AT: &str = "protection_expires_at";
    pub const PROTECTION_REASON: &str = "protection_reason";
    pub const LINKS: &str = "links";
    pub const LINK_DETAILS: &str = "link_details";
    pub const RECORD_KIND: &str = "record_kind";
    pub const MERGED_FROM: &str = "merged_from";
    pub const MERGED_AT: &str = "merged_at";
    pub const MERGE_REASON: &str = "merge_reason";
    pub const EXTRACTION_PATTERN: &str = "extraction_pattern";
    pub const SOURCE_IDS: &str = "source_ids";
}

/// Content stored in a memory record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RecordContent {
    Text(String),
    Structured(serde_json::Value),
}

impl RecordContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Structured(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

/// A single memory record owned by the store.
///
/// The id is immutable for the lifetime of the record. A record whose
/// protection expiry lies in the future must not be deleted by any operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: RecordId,
    /// Agent that owns this record.
    pub agent_id: String,
    pub content: RecordContent,
    pub tags: BTreeSet<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl MemoryRecord {
    pub fn new(agent_id: impl Into<String>, content: RecordContent) -> Self {
        Self {
            id: RecordId::new(),
            agent_id: agent_id.into(),
            content,
            tags: BTreeSet::new(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn text(agent_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(agent_id, RecordContent::Text(text.into()))
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The protection expiry, if one is recorded.
    pub fn protection_expiry(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .get(meta::PROTECTION_EXPIRES_AT)
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn protected_flag(&self) -> bool {
        self.metadata
            .get(meta::PROTECTED)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Whether the record is protected at `now`.
    ///
    /// A protected record without an expiry is protected indefinitely; one
    /// with an expiry is protected until that instant.
    pub fn is_protected_at(&self, now: DateTime<Utc>) -> bool {
        self.protected_flag() && self.protection_expiry().map_or(true, |e| e > now)
    }

    /// Whether the record carries an explicit, unexpired protection expiry.
    ///
    /// Records in this state must never be deleted, regardless of operation
    /// parameters.
    pub fn has_unexpired_protection(&self, now: DateTime<Utc>) -> bool {
        self.protected_flag() && self.protection_expiry().is_some_and(|e| e > now)
    }

    /// Ids this record links to, from `metadata.links`.
    pub fn links(&self) -> BTreeSet<RecordId> {
        self.metadata
            .get(meta::LINKS)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| uuid::Uuid::parse_str(s).ok())
                    .map(RecordId)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace `metadata.links` with the given set.
    pub fn set_links(&mut self, links: &BTreeSet<RecordId>) {
        let arr: Vec<serde_json::Value> = links
            .iter()
            .map(|id| serde_json::Value::String(id.0.to_string()))
            .collect();
        self.metadata
            .insert(meta::LINKS.to_string(), serde_json::Value::Array(arr));
    }
}
