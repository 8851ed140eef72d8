//! Property tests: relabel-with-replacement and preserve are idempotent,
//! and merge never loses tags or source identities.

use std::collections::BTreeSet;
use std::sync::Arc;

use metaforge_sculptor::{HookRegistry, MemorySculptor};
use metaforge_store::{InMemoryStore, MemoryStore};
use metaforge_types::{
    meta, MemoryRecord, RecordId, SculptOperation, SculptorIntent,
};
use proptest::prelude::*;

fn sculptor_rig() -> (Arc<InMemoryStore>, MemorySculptor) {
    let store = Arc::new(InMemoryStore::new());
    let sculptor = MemorySculptor::new(
        Arc::clone(&store) as Arc<dyn MemoryStore>,
        Arc::new(HookRegistry::new()),
    );
    (store, sculptor)
}

fn arb_tag_set(max: usize) -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[a-z]{1,8}", 1..max)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn relabel_replace_with_same_tags_is_idempotent(
        initial in arb_tag_set(5),
        replacement in arb_tag_set(5),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (store, sculptor) = sculptor_rig();
            let mut record = MemoryRecord::text("agent-1", "body");
            record.tags = initial;
            let id = record.id.clone();
            store.put(record).await.unwrap();

            let operation = SculptOperation::Relabel {
                new_tags: Some(replacement.clone()),
                new_metadata: None,
                replace_tags: true,
            };
            sculptor
                .sculpt(SculptorIntent::new("agent-1", vec![id.clone()], operation.clone()))
                .await
                .unwrap();
            let once = store.get(&id).await.unwrap().unwrap();
            assert_eq!(once.tags, replacement);

            sculptor
                .sculpt(SculptorIntent::new("agent-1", vec![id.clone()], operation))
                .await
                .unwrap();
            let twice = store.get(&id).await.unwrap().unwrap();
            assert_eq!(once, twice);
        });
    }

    #[test]
    fn preserve_without_expiry_is_idempotent(
        tags in arb_tag_set(4),
        reason in "[a-z ]{1,20}",
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (store, sculptor) = sculptor_rig();
            let mut record = MemoryRecord::text("agent-1", "body");
            record.tags = tags;
            let id = record.id.clone();
            store.put(record).await.unwrap();

            let operation = SculptOperation::Preserve {
                duration_secs: None,
                reason: Some(reason.clone()),
            };
            sculptor
                .sculpt(SculptorIntent::new("agent-1", vec![id.clone()], operation.clone()))
                .await
                .unwrap();
            let once = store.get(&id).await.unwrap().unwrap();

            sculptor
                .sculpt(SculptorIntent::new("agent-1", vec![id.clone()], operation))
                .await
                .unwrap();
            let twice = store.get(&id).await.unwrap().unwrap();
            assert_eq!(once, twice);
            assert!(twice.tags.contains("protected"));
        });
    }

    #[test]
    fn merge_preserves_tags_and_source_identities(
        tag_sets in prop::collection::vec(arb_tag_set(4), 2..5),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (store, sculptor) = sculptor_rig();
            let mut ids = Vec::new();
            let mut union: BTreeSet<String> = BTreeSet::new();
            for (index, tags) in tag_sets.iter().enumerate() {
                let mut record = MemoryRecord::text("agent-1", format!("body {index}"));
                record.tags = tags.clone();
                union.extend(tags.iter().cloned());
                ids.push(record.id.clone());
                store.put(record).await.unwrap();
            }

            let result = sculptor
                .sculpt(SculptorIntent::new(
                    "agent-1",
                    ids.clone(),
                    SculptOperation::merge(),
                ))
                .await
                .unwrap();
            assert!(result.success);

            let merged = &result.created[0];
            // No tag is lost in the merge.
            assert!(union.is_subset(&merged.tags));

            // Every source id is recorded in the merge provenance.
            let merged_from: BTreeSet<RecordId> = merged.metadata[meta::MERGED_FROM]
                .as_array()
                .unwrap()
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| uuid_from(s))
                .collect();
            let expected: BTreeSet<RecordId> = ids.into_iter().collect();
            assert_eq!(merged_from, expected);
        });
    }
}

fn uuid_from(raw: &str) -> Option<RecordId> {
    raw.parse::<uuid::Uuid>().ok().map(RecordId)
}
