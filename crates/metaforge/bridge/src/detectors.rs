//! Opportunity detectors: pure functions from memory activity to candidate
//! sculpt operations.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use metaforge_types::{MemoryRecord, RecordId, SculptOperation, Urgency};

/// A detector's suggestion, before strategy shaping.
#[derive(Clone, Debug)]
pub struct OpportunityCandidate {
    pub agent_id: String,
    pub operation: SculptOperation,
    pub targets: Vec<RecordId>,
    pub reasoning: String,
    pub confidence: f64,
    pub urgency: Urgency,
}

/// Records sharing at least `merge_threshold` tags with a newly stored one
/// suggest a merge.
pub fn merge_opportunity(
    record: &MemoryRecord,
    peers: &[MemoryRecord],
    merge_threshold: usize,
) -> Option<OpportunityCandidate> {
    if record.tags.is_empty() || merge_threshold == 0 {
        return None;
    }
    let mut overlapping: Vec<(&MemoryRecord, usize)> = peers
        .iter()
        .filter(|p| p.id != record.id)
        .map(|p| (p, p.tags.intersection(&record.tags).count()))
        .filter(|(_, shared)| *shared >= merge_threshold)
        .collect();
    if overlapping.is_empty() {
        return None;
    }
    overlapping.sort_by(|(a, sa), (b, sb)| sb.cmp(sa).then(a.id.cmp(&b.id)));

    let best_overlap = overlapping[0].1;
    let mut targets = vec![record.id.clone()];
    targets.extend(overlapping.iter().take(5).map(|(p, _)| p.id.clone()));
    let confidence = (best_overlap as f64 / record.tags.len() as f64).min(1.0);

    Some(OpportunityCandidate {
        agent_id: record.agent_id.clone(),
        operation: SculptOperation::merge(),
        reasoning: format!(
            "{} record(s) share {best_overlap}+ tags with the new record",
            overlapping.len()
        ),
        targets,
        confidence,
        urgency: Urgency::Medium,
    })
}

/// Records whose text content overlaps the new record's suggest relinking.
pub fn relink_opportunity(
    record: &MemoryRecord,
    peers: &[MemoryRecord],
    overlap_threshold: f64,
) -> Option<OpportunityCandidate> {
    let words = content_tokens(record);
    if words.is_empty() {
        return None;
    }
    let existing_links = record.links();
    let mut related: Vec<(RecordId, f64)> = peers
        .iter()
        .filter(|p| p.id != record.id && !existing_links.contains(&p.id))
        .filter_map(|p| {
            let overlap = jaccard(&words, &content_tokens(p));
            (overlap >= overlap_threshold).then(|| (p.id.clone(), overlap))
        })
        .collect();
    if related.is_empty() {
        return None;
    }
    related.sort_by(|(a, oa), (b, ob)| {
        ob.partial_cmp(oa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(b))
    });

    let confidence = related[0].1.min(1.0);
    let link_to_ids: Vec<RecordId> = related.into_iter().take(5).map(|(id, _)| id).collect();
    Some(OpportunityCandidate {
        agent_id: record.agent_id.clone(),
        reasoning: format!(
            "content overlaps {} existing record(s) above {overlap_threshold:.2}",
            link_to_ids.len()
        ),
        operation: SculptOperation::Relink {
            link_to_ids,
            link_metadata: None,
        },
        targets: vec![record.id.clone()],
        confidence,
        urgency: Urgency::Low,
    })
}

/// Unprotected records untouched for at least the age threshold are prune
/// candidates.
pub fn prune_opportunity(
    agent_id: &str,
    records: &[MemoryRecord],
    age_threshold: chrono::Duration,
    now: DateTime<Utc>,
) -> Option<OpportunityCandidate> {
    let stale: Vec<&MemoryRecord> = records
        .iter()
        .filter(|r| !r.is_protected_at(now) && now - r.timestamp >= age_threshold)
        .collect();
    if stale.is_empty() {
        return None;
    }
    let oldest_age = stale
        .iter()
        .map(|r| (now - r.timestamp).num_seconds())
        .max()
        .unwrap_or(0);
    let confidence = if age_threshold.num_seconds() > 0 {
        (oldest_age as f64 / (2 * age_threshold.num_seconds()) as f64).clamp(0.3, 0.9)
    } else {
        0.5
    };
    Some(OpportunityCandidate {
        agent_id: agent_id.to_string(),
        operation: SculptOperation::prune(),
        reasoning: format!("{} record(s) untouched past the age threshold", stale.len()),
        targets: stale.iter().map(|r| r.id.clone()).collect(),
        confidence,
        urgency: Urgency::Low,
    })
}

/// Records returned frequently by queries are preserve candidates.
pub fn preserve_opportunity(
    agent_id: &str,
    frequent: Vec<RecordId>,
    hit_threshold: usize,
) -> Option<OpportunityCandidate> {
    if frequent.is_empty() {
        return None;
    }
    Some(OpportunityCandidate {
        agent_id: agent_id.to_string(),
        reasoning: format!(
            "{} record(s) returned by at least {hit_threshold} queries",
            frequent.len()
        ),
        operation: SculptOperation::Preserve {
            duration_secs: Some(60 * 60 * 24 * 30),
            reason: Some("frequently recalled".into()),
        },
        targets: frequent,
        confidence: 0.8,
        urgency: Urgency::Low,
    })
}

/// Freshly merged records still carrying a bare tag set suggest a relabel.
pub fn relabel_opportunity(
    agent_id: &str,
    merged: &[MemoryRecord],
) -> Option<OpportunityCandidate> {
    let bare: Vec<&MemoryRecord> = merged
        .iter()
        .filter(|r| r.metadata.contains_key(metaforge_types::meta::MERGED_FROM))
        .filter(|r| r.tags.len() <= 2)
        .collect();
    if bare.is_empty() {
        return None;
    }

    let mut suggested: BTreeSet<String> = BTreeSet::new();
    for record in &bare {
        suggested.extend(descriptive_tags(record));
    }
    if suggested.is_empty() {
        suggested.insert("consolidated".into());
    }

    Some(OpportunityCandidate {
        agent_id: agent_id.to_string(),
        reasoning: format!("{} merged record(s) lack descriptive tags", bare.len()),
        operation: SculptOperation::Relabel {
            new_tags: Some(suggested),
            new_metadata: None,
            replace_tags: false,
        },
        targets: bare.iter().map(|r| r.id.clone()).collect(),
        confidence: 0.6,
        urgency: Urgency::Low,
    })
}

/// Candidate tags from a record's text: the first few distinctive words.
fn descriptive_tags(record: &MemoryRecord) -> BTreeSet<String> {
    match record.content.as_text() {
        Some(text) => text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 4)
            .take(3)
            .collect(),
        None => BTreeSet::new(),
    }
}

fn content_tokens(record: &MemoryRecord) -> BTreeSet<String> {
    match record.content.as_text() {
        Some(text) => text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 3)
            .collect(),
        None => BTreeSet::new(),
    }
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}
