//! End-to-end: a safe relabel proposal clears evaluation, auto-executes and
//! retags the record, with events in causal order.

use std::sync::Arc;

use metaforge_engine::MetaForgingEngine;
use metaforge_store::{InMemoryStore, MemoryStore};
use metaforge_types::{
    BlueprintProposal, ChangeSpecification, ChangeType, ExecutionStatus, MemoryRecord,
    PurposeCore, RiskLevel, SculptOperation, SculptorIntent, TargetComponent,
};

#[tokio::test]
async fn auto_approved_relabel_executes_end_to_end() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let store = Arc::new(InMemoryStore::new());
    let engine = MetaForgingEngine::builder(Arc::clone(&store) as Arc<dyn MemoryStore>)
        .purpose(PurposeCore::new("maintain coherent durable memory"))
        .build();

    let r1 = MemoryRecord::text("agent-1", "observation about drift").with_tag("γ");
    let r1_id = r1.id.clone();
    store.put(r1).await.unwrap();

    let intent = SculptorIntent::new(
        "agent-1",
        vec![r1_id.clone()],
        SculptOperation::Relabel {
            new_tags: Some(["α".to_string(), "β".to_string()].into_iter().collect()),
            new_metadata: None,
            replace_tags: false,
        },
    );
    let proposal =
        BlueprintProposal::builder("tester", TargetComponent::Memory, ChangeType::Modify)
            .specification(ChangeSpecification::sculpt(intent))
            .description("retag the drift observation")
            .purpose_alignment(0.85)
            .risk(RiskLevel::Safe)
            .build();
    let proposal_id = proposal.id.clone();

    engine.submit(proposal).await.unwrap();
    engine.quiesce().await.unwrap();

    // The evaluation cleared the auto-approval bar.
    let evaluations = engine.evaluation_history().unwrap();
    assert_eq!(evaluations.len(), 1);
    assert!(evaluations[0].overall >= 0.7);
    assert!(evaluations[0].approved);

    // Execution succeeded and the record carries the union of tags.
    let history = engine.executor().execution_history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ExecutionStatus::Success);

    let record = store.get(&r1_id).await.unwrap().unwrap();
    let expected: std::collections::BTreeSet<String> =
        ["α", "β", "γ"].into_iter().map(String::from).collect();
    assert_eq!(record.tags, expected);

    // Events for this proposal arrive in causal order.
    let names: Vec<&'static str> = engine
        .bus()
        .recent()
        .unwrap()
        .into_iter()
        .filter(|event| event.proposal_id() == Some(&proposal_id))
        .map(|event| event.name())
        .collect();
    assert_eq!(
        names,
        vec![
            "proposal_queued",
            "proposal_evaluated",
            "execution_started",
            "execution_completed",
        ]
    );
}
