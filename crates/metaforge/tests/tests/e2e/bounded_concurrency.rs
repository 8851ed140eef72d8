//! End-to-end: the engine never runs more concurrent executions than the
//! configured bound, and the queue still drains completely.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metaforge_engine::MetaForgingEngine;
use metaforge_executor::{ApplierContext, ChangeApplier};
use metaforge_store::{InMemoryStore, MemoryStore};
use metaforge_types::{
    BlueprintProposal, ChangeSpecification, ChangeType, ExecutionStatus, ForgeConfig,
    ForgeError, PatchOp, PurposeCore, RiskLevel, SpecPayload, TargetComponent,
};

/// Records the peak number of concurrent `apply` calls.
struct GaugedApplier {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl ChangeApplier for GaugedApplier {
    async fn apply(
        &self,
        _proposal: &BlueprintProposal,
        ctx: &mut ApplierContext<'_>,
    ) -> Result<(), ForgeError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        ctx.log.push("slow change applied".into());
        Ok(())
    }
}

fn protocol_proposal(index: usize) -> BlueprintProposal {
    BlueprintProposal::builder("tester", TargetComponent::Protocol, ChangeType::Modify)
        .specification(ChangeSpecification::new(
            format!("protocol/settings/{index}"),
            SpecPayload::Patch(vec![PatchOp {
                path: format!("protocol/settings/{index}"),
                value: serde_json::json!(index),
            }]),
        ))
        .description("adjust one protocol setting")
        .purpose_alignment(0.9)
        .expected_impact(0.5)
        .risk(RiskLevel::Safe)
        .build()
}

#[tokio::test]
async fn concurrent_executions_stay_within_bound() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MetaForgingEngine::builder(Arc::clone(&store) as Arc<dyn MemoryStore>)
        .purpose(PurposeCore::new("maintain coherent durable memory"))
        .config(ForgeConfig {
            max_concurrent_executions: 2,
            ..ForgeConfig::default()
        })
        .build();

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    engine
        .executor()
        .set_applier(
            TargetComponent::Protocol,
            Arc::new(GaugedApplier {
                current: Arc::clone(&current),
                peak: Arc::clone(&peak),
            }),
        )
        .unwrap();

    for index in 0..5 {
        engine.submit(protocol_proposal(index)).await.unwrap();
        assert!(engine.executor().active_count().unwrap() <= 2);
    }
    engine.quiesce().await.unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 2, "peak = {}", peak.load(Ordering::SeqCst));
    assert_eq!(current.load(Ordering::SeqCst), 0);

    let history = engine.executor().execution_history().unwrap();
    assert_eq!(history.len(), 5);
    assert!(history
        .iter()
        .all(|execution| execution.status == ExecutionStatus::Success));
    assert_eq!(engine.queue_len().unwrap(), 0);
    assert_eq!(engine.executor().active_count().unwrap(), 0);
}
