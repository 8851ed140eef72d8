//! Pure mutation planning for the six sculpt operations.
//!
//! Planning is separated from application: a [`MutationPlan`] is computed
//! from the intent and the captured before-states, then applied to the store
//! in one logical transaction by the sculptor.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use metaforge_types::{
    meta, MemoryRecord, RecordContent, RecordDelta, RecordId, SculptFailure, SculptOperation,
    SculptorIntent,
};

/// Boundary inserted between string contents when merging.
pub const MERGE_BOUNDARY: &str = "\n\n---\n\n";

/// Characters kept on each side of an extracted pattern match.
const EXTRACT_WINDOW: usize = 50;

/// The mutations one sculpt will apply.
///
/// Deleted records are kept whole so the transaction can restore them.
#[derive(Clone, Debug, Default)]
pub struct MutationPlan {
    pub modified: Vec<RecordDelta>,
    pub created: Vec<MemoryRecord>,
    pub deleted: Vec<MemoryRecord>,
}

impl MutationPlan {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.created.is_empty() && self.deleted.is_empty()
    }
}

/// Plan the mutation for `intent` over the captured `targets`.
///
/// `targets` are the before-states, in intent order.
pub fn plan(
    intent: &SculptorIntent,
    targets: &[MemoryRecord],
    now: DateTime<Utc>,
) -> Result<MutationPlan, SculptFailure> {
    match &intent.operation {
        SculptOperation::Relabel {
            new_tags,
            new_metadata,
            replace_tags,
        } => plan_relabel(targets, new_tags.as_ref(), new_metadata.as_ref(), *replace_tags),
        SculptOperation::Merge { delete_originals } => {
            plan_merge(intent, targets, *delete_originals, now)
        }
        SculptOperation::Prune { respect_protection } => {
            plan_prune(targets, *respect_protection, now)
        }
        SculptOperation::Relink {
            link_to_ids,
            link_metadata,
        } => plan_relink(intent, targets, link_to_ids, link_metadata.as_ref(), now),
        SculptOperation::Extract { pattern } => plan_extract(intent, targets, pattern, now),
        SculptOperation::Preserve {
            duration_secs,
            reason,
        } => plan_preserve(targets, *duration_secs, reason.as_deref(), now),
    }
}

fn plan_relabel(
    targets: &[MemoryRecord],
    new_tags: Option<&BTreeSet<String>>,
    new_metadata: Option<&BTreeMap<String, serde_json::Value>>,
    replace_tags: bool,
) -> Result<MutationPlan, SculptFailure> {
    let mut plan = MutationPlan::default();
    for before in targets {
        let mut after = before.clone();
        if let Some(tags) = new_tags {
            if replace_tags {
                after.tags = tags.clone();
            } else {
                after.tags.extend(tags.iter().cloned());
            }
        }
        if let Some(metadata) = new_metadata {
            for (key, value) in metadata {
                after.metadata.insert(key.clone(), value.clone());
            }
        }
        plan.modified.push(RecordDelta {
            before: before.clone(),
            after,
        });
    }
    Ok(plan)
}

fn plan_merge(
    intent: &SculptorIntent,
    targets: &[MemoryRecord],
    delete_originals: bool,
    now: DateTime<Utc>,
) -> Result<MutationPlan, SculptFailure> {
    if delete_originals {
        let protected: Vec<RecordId> = targets
            .iter()
            .filter(|r| r.is_protected_at(now))
            .map(|r| r.id.clone())
            .collect();
        if !protected.is_empty() {
            return Err(SculptFailure::ProtectedTargets { ids: protected });
        }
    }

    // Earliest first; ties break on id so the order is stable.
    let mut sources: Vec<&MemoryRecord> = targets.iter().collect();
    sources.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));

    let content = if sources.iter().all(|r| r.content.is_text()) {
        let joined = sources
            .iter()
            .filter_map(|r| r.content.as_text())
            .collect::<Vec<_>>()
            .join(MERGE_BOUNDARY);
        RecordContent::Text(joined)
    } else {
        let parts: Vec<serde_json::Value> = sources
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id.0.to_string(),
                    "timestamp": r.timestamp.to_rfc3339(),
                    "content": serde_json::to_value(&r.content).unwrap_or(serde_json::Value::Null),
                })
            })
            .collect();
        RecordContent::Structured(serde_json::json!({ "merged": parts }))
    };

    let earliest = sources[0];
    let mut merged = MemoryRecord::new(earliest.agent_id.clone(), content);
    merged.timestamp = now;
    for source in &sources {
        merged.tags.extend(source.tags.iter().cloned());
    }
    merged.tags.extend(intent.tags.iter().cloned());
    merged.metadata.insert(
        meta::MERGED_FROM.into(),
        serde_json::Value::Array(
            sources
                .iter()
                .map(|r| serde_json::Value::String(r.id.0.to_string()))
                .collect(),
        ),
    );
    merged.metadata.insert(
        meta::MERGED_AT.into(),
        serde_json::Value::String(now.to_rfc3339()),
    );
    if let Some(reason) = &intent.reason {
        merged
            .metadata
            .insert(meta::MERGE_REASON.into(), serde_json::Value::String(reason.clone()));
    }

    let mut plan = MutationPlan {
        created: vec![merged],
        ..MutationPlan::default()
    };
    if delete_originals {
        plan.deleted = sources.into_iter().cloned().collect();
    }
    Ok(plan)
}

fn plan_prune(
    targets: &[MemoryRecord],
    respect_protection: bool,
    now: DateTime<Utc>,
) -> Result<MutationPlan, SculptFailure> {
    let protected: Vec<RecordId> = targets
        .iter()
        .filter(|r| {
            if respect_protection {
                r.is_protected_at(now)
            } else {
                // The explicit-expiry rule holds even when protection checks
                // are waived.
                r.has_unexpired_protection(now)
            }
        })
        .map(|r| r.id.clone())
        .collect();
    if !protected.is_empty() {
        return Err(SculptFailure::ProtectedTargets { ids: protected });
    }
    Ok(MutationPlan {
        deleted: targets.to_vec(),
        ..MutationPlan::default()
    })
}

fn plan_relink(
    intent: &SculptorIntent,
    targets: &[MemoryRecord],
    link_to_ids: &[RecordId],
    link_metadata: Option<&BTreeMap<String, serde_json::Value>>,
    now: DateTime<Utc>,
) -> Result<MutationPlan, SculptFailure> {
    let mut plan = MutationPlan::default();
    for before in targets {
        let existing = before.links();
        let mut combined = existing.clone();
        combined.extend(link_to_ids.iter().cloned());

        let mut after = before.clone();
        after.set_links(&combined);

        if let Some(extra) = link_metadata {
            let mut details = after
                .metadata
                .get(meta::LINK_DETAILS)
                .and_then(|v| v.as_object().cloned())
                .unwrap_or_default();
            for link_id in link_to_ids {
                if existing.contains(link_id) {
                    continue;
                }
                let mut entry = serde_json::Map::new();
                entry.insert(
                    "created_at".into(),
                    serde_json::Value::String(now.to_rfc3339()),
                );
                if let Some(reason) = &intent.reason {
                    entry.insert("reason".into(), serde_json::Value::String(reason.clone()));
                }
                for (key, value) in extra {
                    entry.insert(key.clone(), value.clone());
                }
                details.insert(link_id.0.to_string(), serde_json::Value::Object(entry));
            }
            after
                .metadata
                .insert(meta::LINK_DETAILS.into(), serde_json::Value::Object(details));
        }

        plan.modified.push(RecordDelta {
            before: before.clone(),
            after,
        });
    }
    Ok(plan)
}

fn plan_extract(
    intent: &SculptorIntent,
    targets: &[MemoryRecord],
    pattern: &str,
    now: DateTime<Utc>,
) -> Result<MutationPlan, SculptFailure> {
    let mut extracts: Vec<serde_json::Value> = Vec::new();
    for record in targets {
        match record.content.as_text() {
            Some(text) => {
                if let Some(excerpt) = excerpt_around(text, pattern) {
                    extracts.push(serde_json::json!({
                        "source_id": record.id.0.to_string(),
                        "excerpt": excerpt,
                    }));
                }
            }
            None => extracts.push(serde_json::json!({
                "source_id": record.id.0.to_string(),
                "reference_only": true,
            })),
        }
    }

    let mut extracted = MemoryRecord::new(
        intent.agent_id.clone(),
        RecordContent::Structured(serde_json::json!({
            "pattern": pattern,
            "source_count": targets.len(),
            "extracts": extracts,
        })),
    );
    extracted.timestamp = now;
    extracted.tags.extend(intent.tags.iter().cloned());
    extracted.tags.insert("extracted".into());
    extracted.metadata.insert(
        meta::RECORD_KIND.into(),
        serde_json::Value::String("extracted".into()),
    );
    extracted.metadata.insert(
        meta::SOURCE_IDS.into(),
        serde_json::Value::Array(
            targets
                .iter()
                .map(|r| serde_json::Value::String(r.id.0.to_string()))
                .collect(),
        ),
    );
    extracted.metadata.insert(
        meta::EXTRACTION_PATTERN.into(),
        serde_json::Value::String(pattern.to_string()),
    );
    if let Some(reason) = &intent.reason {
        extracted.metadata.insert(
            "extraction_reason".into(),
            serde_json::Value::String(reason.clone()),
        );
    }

    Ok(MutationPlan {
        created: vec![extracted],
        ..MutationPlan::default()
    })
}

fn plan_preserve(
    targets: &[MemoryRecord],
    duration_secs: Option<i64>,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<MutationPlan, SculptFailure> {
    let mut plan = MutationPlan::default();
    for before in targets {
        let mut after = before.clone();
        after
            .metadata
            .insert(meta::PROTECTED.into(), serde_json::Value::Bool(true));
        if let Some(secs) = duration_secs {
            let expiry = now + chrono::Duration::seconds(secs);
            after.metadata.insert(
                meta::PROTECTION_EXPIRES_AT.into(),
                serde_json::Value::String(expiry.to_rfc3339()),
            );
        }
        if let Some(reason) = reason {
            after.metadata.insert(
                meta::PROTECTION_REASON.into(),
                serde_json::Value::String(reason.to_string()),
            );
        }
        after.tags.insert("protected".into());
        plan.modified.push(RecordDelta {
            before: before.clone(),
            after,
        });
    }
    Ok(plan)
}

/// Window of ±[`EXTRACT_WINDOW`] characters around the first occurrence of
/// `pattern`, clamped to the text bounds.
fn excerpt_around(text: &str, pattern: &str) -> Option<String> {
    let byte_pos = text.find(pattern)?;
    let char_indices: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    let char_pos = char_indices
        .iter()
        .position(|b| *b == byte_pos)
        .unwrap_or(0);
    let pattern_len = pattern.chars().count();

    let start = char_pos.saturating_sub(EXTRACT_WINDOW);
    let end = (char_pos + pattern_len + EXTRACT_WINDOW).min(char_indices.len());
    let start_byte = char_indices[start];
    let end_byte = if end == char_indices.len() {
        text.len()
    } else {
        char_indices[end]
    };
    Some(text[start_byte..end_byte].to_string())
}
