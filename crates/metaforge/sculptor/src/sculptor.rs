use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use metaforge_store::MemoryStore;
use metaforge_types::{
    ForgeError, MemoryRecord, RecordId, SculptFailure, SculptOperation, SculptorIntent,
    SculptorResult,
};

use crate::hooks::{HookDecision, HookRegistry};
use crate::ops::{self, MutationPlan};

/// Bounds and switches for the sculptor.
#[derive(Clone, Debug)]
pub struct SculptorConfig {
    pub max_memories_per_operation: usize,
    /// Resolve every target id during validation.
    pub validate_targets: bool,
}

impl Default for SculptorConfig {
    fn default() -> Self {
        Self {
            max_memories_per_operation: 50,
            validate_targets: true,
        }
    }
}

/// Applies one typed operation to a set of records as a logical transaction.
pub struct MemorySculptor {
    store: Arc<dyn MemoryStore>,
    hooks: Arc<HookRegistry>,
    config: SculptorConfig,
}

impl MemorySculptor {
    pub fn new(store: Arc<dyn MemoryStore>, hooks: Arc<HookRegistry>) -> Self {
        Self::with_config(store, hooks, SculptorConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn MemoryStore>,
        hooks: Arc<HookRegistry>,
        config: SculptorConfig,
    ) -> Self {
        Self {
            store,
            hooks,
            config,
        }
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Apply `intent` to the store.
    ///
    /// Validation failures surface as `Err(InvalidIntent)` before any hook
    /// runs. After validation the call always yields a [`SculptorResult`]:
    /// vetoes, protection violations and store failures are recorded on the
    /// result with `success = false` and zero surviving mutations.
    pub async fn sculpt(&self, intent: SculptorIntent) -> Result<SculptorResult, ForgeError> {
        let intent = self.validate(intent).await?;

        if let HookDecision::Veto { hook_id, reason } = self.hooks.invoke_pre(&intent).await? {
            info!(hook_id = %hook_id, reason = %reason, "sculpt vetoed by pre-hook");
            let result =
                SculptorResult::failed(intent, SculptFailure::HookVetoed { hook_id, reason });
            self.observe(&result).await;
            return Ok(result);
        }

        let result = match self.run(&intent).await {
            Ok(plan) => SculptorResult::succeeded(
                intent,
                plan.modified,
                plan.created,
                plan.deleted.iter().map(|r| r.id.clone()).collect(),
            ),
            Err(failure) => {
                warn!(error = %failure, "sculpt failed");
                SculptorResult::failed(intent, failure)
            }
        };

        info!(
            operation = %result.intent.operation.kind(),
            agent_id = %result.intent.agent_id,
            success = result.success,
            affected = result.affected_ids.len(),
            "sculpt completed"
        );
        self.observe(&result).await;
        Ok(result)
    }

    /// Post-hook pass; its failures never change the sculpt outcome.
    async fn observe(&self, result: &SculptorResult) {
        if let Err(error) = self.hooks.invoke_post(result).await {
            warn!(error = %error, "post-hook pass skipped");
        }
    }

    /// Plan and apply; on partial failure every applied step is reversed.
    async fn run(&self, intent: &SculptorIntent) -> Result<MutationPlan, SculptFailure> {
        let targets = self.load_targets(intent).await?;
        let plan = ops::plan(intent, &targets, Utc::now())?;
        self.apply(&plan).await?;
        Ok(plan)
    }

    /// Precondition checks; violations never reach the hooks or the store.
    async fn validate(&self, mut intent: SculptorIntent) -> Result<SculptorIntent, ForgeError> {
        if intent.agent_id.trim().is_empty() {
            return Err(ForgeError::InvalidIntent("agent id is empty".into()));
        }
        if intent.targets.is_empty() {
            return Err(ForgeError::InvalidIntent("target set is empty".into()));
        }

        // Target set semantics: drop duplicates, keep first-seen order.
        let mut seen = std::collections::BTreeSet::new();
        intent.targets.retain(|id| seen.insert(id.clone()));

        if intent.targets.len() > self.config.max_memories_per_operation {
            return Err(ForgeError::InvalidIntent(format!(
                "{} targets exceed the per-operation maximum of {}",
                intent.targets.len(),
                self.config.max_memories_per_operation
            )));
        }

        match &intent.operation {
            SculptOperation::Relabel {
                new_tags,
                new_metadata,
                ..
            } => {
                if new_tags.is_none() && new_metadata.is_none() {
                    return Err(ForgeError::InvalidIntent(
                        "relabel requires new tags or new metadata".into(),
                    ));
                }
            }
            SculptOperation::Merge { .. } => {
                if intent.targets.len() < 2 {
                    return Err(ForgeError::InvalidIntent(
                        "merge requires at least two targets".into(),
                    ));
                }
            }
            SculptOperation::Relink { link_to_ids, .. } => {
                if link_to_ids.is_empty() {
                    return Err(ForgeError::InvalidIntent(
                        "relink requires at least one link destination".into(),
                    ));
                }
                for id in link_to_ids {
                    if self.resolve(id).await?.is_none() {
                        return Err(ForgeError::InvalidIntent(format!(
                            "link destination {id} does not resolve"
                        )));
                    }
                }
            }
            SculptOperation::Extract { pattern } => {
                if pattern.is_empty() {
                    return Err(ForgeError::InvalidIntent(
                        "extract requires a non-empty pattern".into(),
                    ));
                }
            }
            SculptOperation::Prune { .. } | SculptOperation::Preserve { .. } => {}
        }

        if self.config.validate_targets {
            for id in &intent.targets {
                if self.resolve(id).await?.is_none() {
                    return Err(ForgeError::InvalidIntent(format!(
                        "target {id} does not resolve"
                    )));
                }
            }
        }

        Ok(intent)
    }

    async fn resolve(&self, id: &RecordId) -> Result<Option<MemoryRecord>, ForgeError> {
        self.store.get(id).await
    }

    /// Capture the before-state of every target, in intent order.
    async fn load_targets(
        &self,
        intent: &SculptorIntent,
    ) -> Result<Vec<MemoryRecord>, SculptFailure> {
        let mut records = Vec::with_capacity(intent.targets.len());
        for id in &intent.targets {
            match self.store.get(id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    return Err(SculptFailure::Store {
                        message: format!("target {id} disappeared before mutation"),
                    })
                }
                Err(error) => {
                    return Err(SculptFailure::Store {
                        message: error.to_string(),
                    })
                }
            }
        }
        Ok(records)
    }

    /// Apply the plan; if any step fails, restore every already-applied step
    /// before returning the failure.
    async fn apply(&self, plan: &MutationPlan) -> Result<(), SculptFailure> {
        let mut applied_puts: Vec<&MemoryRecord> = Vec::new();
        let mut applied_creates: Vec<&RecordId> = Vec::new();
        let mut applied_deletes: Vec<&MemoryRecord> = Vec::new();

        for delta in &plan.modified {
            if let Err(error) = self.store.put(delta.after.clone()).await {
                let failure = SculptFailure::Store {
                    message: error.to_string(),
                };
                self.unwind(&applied_puts, &applied_creates, &applied_deletes)
                    .await;
                return Err(failure);
            }
            applied_puts.push(&delta.before);
        }

        for record in &plan.created {
            if let Err(error) = self.store.put(record.clone()).await {
                let failure = SculptFailure::Store {
                    message: error.to_string(),
                };
                self.unwind(&applied_puts, &applied_creates, &applied_deletes)
                    .await;
                return Err(failure);
            }
            applied_creates.push(&record.id);
        }

        for record in &plan.deleted {
            if let Err(error) = self.store.delete(&record.id).await {
                let failure = SculptFailure::Store {
                    message: error.to_string(),
                };
                self.unwind(&applied_puts, &applied_creates, &applied_deletes)
                    .await;
                return Err(failure);
            }
            applied_deletes.push(record);
        }

        Ok(())
    }

    /// Best-effort restoration of the captured before-states.
    async fn unwind(
        &self,
        puts: &[&MemoryRecord],
        creates: &[&RecordId],
        deletes: &[&MemoryRecord],
    ) {
        debug!(
            puts = puts.len(),
            creates = creates.len(),
            deletes = deletes.len(),
            "unwinding partial sculpt"
        );
        for record in deletes {
            if let Err(error) = self.store.put((*record).clone()).await {
                warn!(id = %record.id, error = %error, "failed to restore deleted record");
            }
        }
        for id in creates {
            if let Err(error) = self.store.delete(id).await {
                warn!(id = %id, error = %error, "failed to remove created record");
            }
        }
        for record in puts {
            if let Err(error) = self.store.put((*record).clone()).await {
                warn!(id = %record.id, error = %error, "failed to restore modified record");
            }
        }
    }
}
