//! End-to-end: the change applier fails on the second of three paths; the
//! execution rolls back and the proposal's event trail ends with
//! `rollback_succeeded`.

use std::sync::Arc;

use async_trait::async_trait;
use metaforge_engine::MetaForgingEngine;
use metaforge_executor::{ApplierContext, ChangeApplier};
use metaforge_store::{InMemoryStore, MemoryStore};
use metaforge_types::{
    BlueprintProposal, ChangeRecord, ChangeSpecification, ChangeType, ExecutionStatus,
    ForgeError, PatchOp, PurposeCore, RiskLevel, SpecPayload, TargetComponent,
};

/// Applies patch paths in order and refuses the given one.
struct TrippingApplier {
    fail_at: usize,
}

#[async_trait]
impl ChangeApplier for TrippingApplier {
    async fn apply(
        &self,
        proposal: &BlueprintProposal,
        ctx: &mut ApplierContext<'_>,
    ) -> Result<(), ForgeError> {
        let SpecPayload::Patch(ops) = &proposal.specification.payload else {
            return Err(ForgeError::InvalidProposal("expected a patch payload".into()));
        };
        for (index, op) in ops.iter().enumerate() {
            if index == self.fail_at {
                return Err(ForgeError::StoreError(format!(
                    "subsystem refused {}",
                    op.path
                )));
            }
            ctx.changes.push(ChangeRecord {
                path: op.path.clone(),
                before: None,
                after: Some(op.value.clone()),
            });
            ctx.log.push(format!("applied {}", op.path));
        }
        Ok(())
    }
}

#[tokio::test]
async fn applier_failure_mid_change_rolls_back() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MetaForgingEngine::builder(Arc::clone(&store) as Arc<dyn MemoryStore>)
        .purpose(PurposeCore::new("maintain coherent durable memory"))
        .build();
    engine
        .executor()
        .set_applier(
            TargetComponent::Protocol,
            Arc::new(TrippingApplier { fail_at: 1 }),
        )
        .unwrap();

    let ops = (0..3)
        .map(|index| PatchOp {
            path: format!("protocol/settings/{index}"),
            value: serde_json::json!({"revision": index}),
        })
        .collect();
    let proposal =
        BlueprintProposal::builder("tester", TargetComponent::Protocol, ChangeType::Modify)
            .specification(ChangeSpecification::new(
                "protocol/settings",
                SpecPayload::Patch(ops),
            ))
            .description("revise three protocol settings")
            .purpose_alignment(0.9)
            .expected_impact(0.5)
            .risk(RiskLevel::Safe)
            .build();
    let proposal_id = proposal.id.clone();

    engine.submit(proposal).await.unwrap();
    engine.quiesce().await.unwrap();

    let history = engine.executor().execution_history().unwrap();
    assert_eq!(history.len(), 1);
    let execution = &history[0];
    assert_eq!(execution.status, ExecutionStatus::RolledBack);
    // The partial change set was withdrawn by the rollback.
    assert!(execution.changes.is_empty());
    let rollback = execution.rollback.as_ref().unwrap();
    assert!(rollback.succeeded);

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
            "execution_failed",
            "rollback_succeeded",
        ]
    );
}
