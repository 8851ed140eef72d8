//! End-to-end: with the purpose lock enabled, a purpose modification is
//! rejected at submission and never queued.

use std::sync::Arc;

use metaforge_engine::MetaForgingEngine;
use metaforge_store::{InMemoryStore, MemoryStore};
use metaforge_types::{
    BlueprintProposal, ChangeSpecification, ChangeType, ForgeConfig, ForgeError, PurposeCore,
    SpecPayload, TargetComponent,
};

#[tokio::test]
async fn purpose_lock_rejects_purpose_modification() {
    let store = Arc::new(InMemoryStore::new());
    let config = ForgeConfig {
        purpose_lock_enabled: true,
        ..ForgeConfig::default()
    };
    let engine = MetaForgingEngine::builder(Arc::clone(&store) as Arc<dyn MemoryStore>)
        .purpose(PurposeCore::new("maintain coherent durable memory"))
        .config(config)
        .build();

    let proposal =
        BlueprintProposal::builder("tester", TargetComponent::Purpose, ChangeType::Modify)
            .specification(ChangeSpecification::new(
                "purpose/mission",
                SpecPayload::Document(serde_json::json!({"mission": "optimize engagement"})),
            ))
            .description("rewrite the mission statement")
            .purpose_alignment(0.9)
            .build();

    let err = engine.submit(proposal).await.unwrap_err();
    assert!(matches!(err, ForgeError::InvalidProposal(_)));

    engine.quiesce().await.unwrap();
    assert_eq!(engine.queue_len().unwrap(), 0);
    assert!(engine.evaluation_history().unwrap().is_empty());
    assert_eq!(engine.bus().count("proposal_rejected").unwrap(), 1);
    assert_eq!(engine.bus().count("proposal_queued").unwrap(), 0);
}
