//! Change appliers: per-component strategies for applying a proposal's
//! specification.
//!
//! The memory applier delegates to the sculptor; the recording applier
//! (agent, protocol, architecture, purpose) records change triples without
//! mutating anything outside the execution record.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use metaforge_sculptor::{HookRegistry, MemorySculptor, SculptorConfig};
use metaforge_store::InMemoryStore;
use metaforge_types::{
    BlueprintProposal, ChangeRecord, ForgeError, MemoryRecord, RecordId, SculptFailure,
    SpecPayload, TargetComponent,
};

/// Before-states captured ahead of an execution, sufficient to revert it.
#[derive(Clone, Debug, Default)]
pub struct Checkpoint {
    pub records: Vec<MemoryRecord>,
    pub taken_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn capture(records: Vec<MemoryRecord>) -> Self {
        Self {
            records,
            taken_at: Some(Utc::now()),
        }
    }

    pub fn record(&self, id: &RecordId) -> Option<&MemoryRecord> {
        self.records.iter().find(|r| &r.id == id)
    }
}

/// Mutable view of the in-flight execution handed to an applier.
pub struct ApplierContext<'a> {
    pub changes: &'a mut Vec<ChangeRecord>,
    pub log: &'a mut Vec<String>,
    /// Records the applier created; reverted by deleting them.
    pub created_ids: &'a mut Vec<RecordId>,
    pub checkpoint: &'a Checkpoint,
    /// Dry-run the change against a scratch store before live mutation.
    pub sandbox_first: bool,
    pub cancel: &'a AtomicBool,
}

impl ApplierContext<'_> {
    /// Appliers check this between paths and stop early when set.
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Applies one proposal's specification for a target component.
#[async_trait]
pub trait ChangeApplier: Send + Sync {
    async fn apply(
        &self,
        proposal: &BlueprintProposal,
        ctx: &mut ApplierContext<'_>,
    ) -> Result<(), ForgeError>;
}

/// Applier for `memory`-component proposals: delegates to the sculptor.
pub struct MemoryApplier {
    sculptor: Arc<MemorySculptor>,
}

impl MemoryApplier {
    pub fn new(sculptor: Arc<MemorySculptor>) -> Self {
        Self { sculptor }
    }

    /// Replay the sculpt against a scratch store seeded from the checkpoint.
    ///
    /// The scratch run is hook-free and skips target resolution for link
    /// destinations that live outside the checkpoint.
    async fn sandbox_check(
        &self,
        proposal: &BlueprintProposal,
        ctx: &mut ApplierContext<'_>,
    ) -> Result<(), ForgeError> {
        let intent = proposal
            .sculpt_intent()
            .cloned()
            .ok_or_else(|| missing_sculpt_payload(proposal))?;

        let scratch = Arc::new(InMemoryStore::new());
        scratch.seed(ctx.checkpoint.records.iter().cloned())?;
        let sandbox = MemorySculptor::with_config(
            scratch,
            Arc::new(HookRegistry::new()),
            SculptorConfig {
                validate_targets: false,
                ..SculptorConfig::default()
            },
        );
        let result = sandbox.sculpt(intent).await?;
        if result.success {
            ctx.log.push("sandbox check passed".into());
            Ok(())
        } else {
            let reason = result
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown sandbox failure".into());
            Err(ForgeError::InvalidProposal(format!(
                "sandbox check failed: {reason}"
            )))
        }
    }
}

#[async_trait]
impl ChangeApplier for MemoryApplier {
    async fn apply(
        &self,
        proposal: &BlueprintProposal,
        ctx: &mut ApplierContext<'_>,
    ) -> Result<(), ForgeError> {
        if ctx.cancelled() {
            return Ok(());
        }
        if ctx.sandbox_first {
            self.sandbox_check(proposal, ctx).await?;
        }
        let intent = proposal
            .sculpt_intent()
            .cloned()
            .ok_or_else(|| missing_sculpt_payload(proposal))?;

        let result = self.sculptor.sculpt(intent).await?;
        if !result.success {
            let failure = result.error.unwrap_or(SculptFailure::Invalid {
                message: "sculpt failed without a recorded cause".into(),
            });
            return Err(failure.into());
        }

        for delta in &result.modified {
            ctx.changes.push(ChangeRecord {
                path: format!("memory/{}", delta.before.id),
                before: Some(serde_json::to_value(&delta.before).unwrap_or_default()),
                after: Some(serde_json::to_value(&delta.after).unwrap_or_default()),
            });
        }
        for created in &result.created {
            ctx.created_ids.push(created.id.clone());
            ctx.changes.push(ChangeRecord {
                path: format!("memory/{}", created.id),
                before: None,
                after: Some(serde_json::to_value(created).unwrap_or_default()),
            });
        }
        for deleted in &result.deleted {
            let before = ctx
                .checkpoint
                .record(deleted)
                .and_then(|r| serde_json::to_value(r).ok());
            ctx.changes.push(ChangeRecord {
                path: format!("memory/{}", deleted),
                before,
                after: None,
            });
        }
        ctx.log.push(format!(
            "sculpt {} touched {} record(s)",
            result.intent.operation.kind(),
            result.affected_ids.len()
        ));
        Ok(())
    }
}

fn missing_sculpt_payload(proposal: &BlueprintProposal) -> ForgeError {
    ForgeError::InvalidProposal(format!(
        "memory proposal {} carries no sculpt payload",
        proposal.id
    ))
}

/// Applier for non-memory components.
///
/// These subsystems are external collaborators; their changes are recorded
/// and surfaced on the event stream without live mutation.
pub struct RecordingApplier {
    component: TargetComponent,
}

impl RecordingApplier {
    pub fn new(component: TargetComponent) -> Self {
        Self { component }
    }
}

#[async_trait]
impl ChangeApplier for RecordingApplier {
    async fn apply(
        &self,
        proposal: &BlueprintProposal,
        ctx: &mut ApplierContext<'_>,
    ) -> Result<(), ForgeError> {
        match &proposal.specification.payload {
            SpecPayload::Patch(ops) => {
                for op in ops {
                    if ctx.cancelled() {
                        return Ok(());
                    }
                    ctx.changes.push(ChangeRecord {
                        path: op.path.clone(),
                        before: None,
                        after: Some(op.value.clone()),
                    });
                    ctx.log
                        .push(format!("{} change recorded at {}", self.component, op.path));
                }
                Ok(())
            }
            SpecPayload::Document(value) => {
                ctx.changes.push(ChangeRecord {
                    path: proposal.specification.path.clone(),
                    before: None,
                    after: Some(value.clone()),
                });
                ctx.log.push(format!(
                    "{} change recorded at {}",
                    self.component, proposal.specification.path
                ));
                Ok(())
            }
            SpecPayload::Empty => {
                debug!(component = %self.component, "empty specification, nothing to record");
                ctx.log.push(format!(
                    "{} specification carried no payload",
                    self.component
                ));
                Ok(())
            }
            SpecPayload::Sculpt(_) => Err(ForgeError::InvalidProposal(format!(
                "{} proposals cannot carry a sculpt payload",
                self.component
            ))),
        }
    }
}
