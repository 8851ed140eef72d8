//! End-to-end: a scoped pre-hook vetoes a prune; no mutation happens and the
//! post-hook still observes the failed result.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use metaforge_sculptor::{
    HookFilter, HookRegistration, HookRegistry, MemorySculptor, PreHookOutcome, SculptHook,
};
use metaforge_store::{InMemoryStore, MemoryStore};
use metaforge_types::{
    MemoryRecord, OperationKind, SculptFailure, SculptOperation, SculptorIntent, SculptorResult,
};

struct FreezeHook;

#[async_trait]
impl SculptHook for FreezeHook {
    async fn pre(&self, _intent: &SculptorIntent) -> PreHookOutcome {
        PreHookOutcome::Veto {
            reason: "prunes are frozen for this agent".into(),
        }
    }
}

struct Observer {
    observed: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

#[async_trait]
impl SculptHook for Observer {
    async fn post(&self, result: &SculptorResult) -> anyhow::Result<()> {
        self.observed.fetch_add(1, Ordering::Relaxed);
        if !result.success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

#[tokio::test]
async fn scoped_veto_blocks_prune_and_posts_observe() {
    let store = Arc::new(InMemoryStore::new());
    let mut ids = Vec::new();
    for text in ["one", "two", "three"] {
        let rec = MemoryRecord::text("A1", text);
        ids.push(rec.id.clone());
        store.put(rec).await.unwrap();
    }

    let hooks = Arc::new(HookRegistry::new());
    hooks
        .register(
            HookRegistration::new("freeze-a1-prunes")
                .with_filter(
                    HookFilter::wildcard()
                        .for_operation(OperationKind::Prune)
                        .for_agent("A1"),
                )
                .with_priority(10),
            Arc::new(FreezeHook),
        )
        .unwrap();
    let observed = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    hooks
        .register(
            HookRegistration::new("observer"),
            Arc::new(Observer {
                observed: Arc::clone(&observed),
                failures: Arc::clone(&failures),
            }),
        )
        .unwrap();

    let sculptor = MemorySculptor::new(Arc::clone(&store) as Arc<dyn MemoryStore>, hooks);
    let result = sculptor
        .sculpt(SculptorIntent::new(
            "A1",
            ids.clone(),
            SculptOperation::prune(),
        ))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(matches!(
        result.error,
        Some(SculptFailure::HookVetoed { .. })
    ));
    assert!(result.affected_ids.is_empty());

    // Zero mutations.
    assert_eq!(store.len().unwrap(), 3);
    for id in &ids {
        assert!(store.get(id).await.unwrap().is_some());
    }

    // The post-hook observed the vetoed result.
    assert_eq!(observed.load(Ordering::Relaxed), 1);
    assert_eq!(failures.load(Ordering::Relaxed), 1);

    // An out-of-scope agent is unaffected by the freeze.
    let rec = MemoryRecord::text("A2", "disposable");
    let rec_id = rec.id.clone();
    store.put(rec).await.unwrap();
    let result = sculptor
        .sculpt(SculptorIntent::new(
            "A2",
            vec![rec_id.clone()],
            SculptOperation::prune(),
        ))
        .await
        .unwrap();
    assert!(result.success);
    assert!(store.get(&rec_id).await.unwrap().is_none());
}
