//! End-to-end: a prune over a mixed target set aborts atomically when one
//! target is protected with an unexpired expiry.

use std::sync::Arc;

use chrono::Utc;
use metaforge_sculptor::{HookRegistry, MemorySculptor};
use metaforge_store::{InMemoryStore, MemoryStore};
use metaforge_types::{
    meta, MemoryRecord, SculptFailure, SculptOperation, SculptorIntent,
};

#[tokio::test]
async fn protected_prune_aborts_atomically() {
    let store = Arc::new(InMemoryStore::new());
    let sculptor = MemorySculptor::new(
        Arc::clone(&store) as Arc<dyn MemoryStore>,
        Arc::new(HookRegistry::new()),
    );

    let r1 = MemoryRecord::text("agent-1", "stale scratchpad");
    let r2 = MemoryRecord::text("agent-1", "audit evidence")
        .with_metadata(meta::PROTECTED, serde_json::Value::Bool(true))
        .with_metadata(
            meta::PROTECTION_EXPIRES_AT,
            serde_json::Value::String((Utc::now() + chrono::Duration::hours(1)).to_rfc3339()),
        );
    let r3 = MemoryRecord::text("agent-1", "old transcript");
    let (id1, id2, id3) = (r1.id.clone(), r2.id.clone(), r3.id.clone());
    store.seed(vec![r1.clone(), r2.clone(), r3.clone()]).unwrap();

    let result = sculptor
        .sculpt(SculptorIntent::new(
            "agent-1",
            vec![id1.clone(), id2.clone(), id3.clone()],
            SculptOperation::prune(),
        ))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(
        result.error,
        Some(SculptFailure::ProtectedTargets {
            ids: vec![id2.clone()]
        })
    );
    assert!(result.affected_ids.is_empty());

    // All three records are unchanged.
    assert_eq!(store.get(&id1).await.unwrap(), Some(r1));
    assert_eq!(store.get(&id2).await.unwrap(), Some(r2));
    assert_eq!(store.get(&id3).await.unwrap(), Some(r3));
}
