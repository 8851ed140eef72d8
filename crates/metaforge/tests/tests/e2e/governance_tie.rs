//! End-to-end: a governance-routed merge splits the vote evenly and resolves
//! deferred; the engine emits `proposal_deferred` and never executes it.

use std::sync::Arc;

use metaforge_engine::MetaForgingEngine;
use metaforge_governance::{GovernanceController, StaticMember};
use metaforge_store::{InMemoryStore, MemoryStore};
use metaforge_types::{
    BlueprintProposal, ChangeSpecification, ChangeType, FinalDecision, ForgeConfig, MemoryRecord,
    PurposeCore, RiskLevel, SculptOperation, SculptorIntent, SessionStatus, TargetComponent,
    Urgency, VoteChoice,
};

#[tokio::test]
async fn tied_merge_vote_is_deferred() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MetaForgingEngine::builder(Arc::clone(&store) as Arc<dyn MemoryStore>)
        .purpose(PurposeCore::new("maintain coherent durable memory"))
        .config(ForgeConfig {
            min_quorum: 3,
            consensus_threshold: 0.67,
            ..ForgeConfig::default()
        })
        .build();

    // Twenty-five mergeable records.
    let mut targets = Vec::new();
    for index in 0..25 {
        let rec = MemoryRecord::text("agent-1", format!("fragment {index}")).with_tag("fragment");
        targets.push(rec.id.clone());
        store.put(rec).await.unwrap();
    }

    let intent = SculptorIntent::new("agent-1", targets, SculptOperation::merge());
    let proposal =
        BlueprintProposal::builder("tester", TargetComponent::Memory, ChangeType::Merge)
            .specification(ChangeSpecification::sculpt(intent))
            .description("merge fragments into one coherent durable memory record")
            .purpose_alignment(0.9)
            .expected_impact(0.6)
            .risk(RiskLevel::Safe)
            .build();
    let proposal_id = proposal.id.clone();

    engine.submit(proposal).await.unwrap();
    engine.quiesce().await.unwrap();
    assert!(engine.held_ids().unwrap().contains(&proposal_id));

    let controller = GovernanceController::new(Arc::clone(&engine));
    for index in 0..4 {
        controller
            .register_member(Arc::new(StaticMember::new(
                format!("member-{index}"),
                1.0,
                VoteChoice::Abstain,
                0.5,
            )))
            .unwrap();
    }

    let held = engine.held_proposal(&proposal_id).unwrap().unwrap();
    let session_id = controller.open_session(held, Urgency::Medium).unwrap();
    {
        let session = controller.session(&session_id).unwrap().unwrap();
        assert_eq!(session.quorum, 3);
        assert_eq!(session.consensus_threshold, 0.67);
    }

    controller
        .cast_vote(&session_id, "member-0", VoteChoice::Approve, 0.9)
        .unwrap();
    controller
        .cast_vote(&session_id, "member-1", VoteChoice::Approve, 0.8)
        .unwrap();
    controller
        .cast_vote(&session_id, "member-2", VoteChoice::Reject, 0.9)
        .unwrap();
    // The final ballot completes the electorate: 2 vs 2 with equal weights
    // is a tie, so the session resolves deferred.
    let status = controller
        .cast_vote(&session_id, "member-3", VoteChoice::Reject, 0.8)
        .unwrap();
    assert_eq!(status, SessionStatus::Completed);

    let archived = controller.archive().unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].decision, Some(FinalDecision::Deferred));
    assert_eq!(archived[0].votes.len(), 4);

    engine.quiesce().await.unwrap();
    assert_eq!(engine.bus().count("proposal_deferred").unwrap(), 1);
    assert_eq!(engine.bus().count("execution_started").unwrap(), 0);
    assert!(engine.executor().execution_history().unwrap().is_empty());
    // All twenty-five records survived.
    assert_eq!(store.len().unwrap(), 25);
}
