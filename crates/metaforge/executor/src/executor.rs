use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{info, warn};

use metaforge_sculptor::MemorySculptor;
use metaforge_store::MemoryStore;
use metaforge_types::{
    BlueprintProposal, EvaluationResult, EventSink, ExecutionId, ExecutionStatus, ForgeError,
    ForgeEvent, ForgeExecution, NullSink, RecordId, RollbackAttempt, RollbackStrategy,
    TargetComponent,
};

use crate::appliers::{
    ApplierContext, ChangeApplier, Checkpoint, MemoryApplier, RecordingApplier,
};

/// Bounds and switches for the executor.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub max_concurrent_executions: usize,
    pub sandbox_first: bool,
    /// Finished executions retained in history before eviction.
    pub history_limit: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 3,
            sandbox_first: false,
            history_limit: 256,
        }
    }
}

/// Runs approved proposals with checkpointing, rollback and a bounded
/// active set.
pub struct ForgeExecutor {
    store: Arc<dyn MemoryStore>,
    appliers: RwLock<HashMap<TargetComponent, Arc<dyn ChangeApplier>>>,
    active: RwLock<HashMap<ExecutionId, ForgeExecution>>,
    cancel_flags: RwLock<HashMap<ExecutionId, Arc<AtomicBool>>>,
    history: RwLock<VecDeque<ForgeExecution>>,
    events: Arc<dyn EventSink>,
    config: ExecutorConfig,
}

impl ForgeExecutor {
    /// Executor with the default applier set: the sculptor-backed memory
    /// applier plus recording appliers for the other components.
    pub fn new(
        store: Arc<dyn MemoryStore>,
        sculptor: Arc<MemorySculptor>,
        events: Arc<dyn EventSink>,
        config: ExecutorConfig,
    ) -> Self {
        let mut appliers: HashMap<TargetComponent, Arc<dyn ChangeApplier>> = HashMap::new();
        appliers.insert(
            TargetComponent::Memory,
            Arc::new(MemoryApplier::new(sculptor)),
        );
        for component in [
            TargetComponent::Agent,
            TargetComponent::Protocol,
            TargetComponent::Architecture,
            TargetComponent::Purpose,
        ] {
            appliers.insert(component, Arc::new(RecordingApplier::new(component)));
        }
        Self {
            store,
            appliers: RwLock::new(appliers),
            active: RwLock::new(HashMap::new()),
            cancel_flags: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            events,
            config,
        }
    }

    pub fn unobserved(
        store: Arc<dyn MemoryStore>,
        sculptor: Arc<MemorySculptor>,
        config: ExecutorConfig,
    ) -> Self {
        Self::new(store, sculptor, Arc::new(NullSink), config)
    }

    /// Replace the applier for one component. Tests and embedders use this
    /// to stub out a collaborator.
    pub fn set_applier(
        &self,
        component: TargetComponent,
        applier: Arc<dyn ChangeApplier>,
    ) -> Result<(), ForgeError> {
        let mut appliers = self.appliers.write().map_err(|_| ForgeError::LockError)?;
        appliers.insert(component, applier);
        Ok(())
    }

    pub fn active_count(&self) -> Result<usize, ForgeError> {
        let active = self.active.read().map_err(|_| ForgeError::LockError)?;
        Ok(active.len())
    }

    pub fn active_executions(&self) -> Result<Vec<ForgeExecution>, ForgeError> {
        let active = self.active.read().map_err(|_| ForgeError::LockError)?;
        Ok(active.values().cloned().collect())
    }

    pub fn execution_history(&self) -> Result<Vec<ForgeExecution>, ForgeError> {
        let history = self.history.read().map_err(|_| ForgeError::LockError)?;
        Ok(history.iter().cloned().collect())
    }

    /// Request cancellation of a running execution. The applier observes the
    /// flag between paths; the execution then fails and rolls back.
    pub fn cancel(&self, id: &ExecutionId) -> Result<bool, ForgeError> {
        let flags = self.cancel_flags.read().map_err(|_| ForgeError::LockError)?;
        match flags.get(id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Execute an approved proposal.
    ///
    /// Fails fast with `NotApproved` or `ConcurrencyLimitReached`; once an
    /// execution starts it always terminates with an execution record.
    pub async fn execute(
        &self,
        proposal: &BlueprintProposal,
        evaluation: &EvaluationResult,
    ) -> Result<ForgeExecution, ForgeError> {
        if !evaluation.approved {
            return Err(ForgeError::NotApproved(proposal.id.clone()));
        }

        let mut execution = ForgeExecution::new(proposal.id.clone());
        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut active = self.active.write().map_err(|_| ForgeError::LockError)?;
            if active.len() >= self.config.max_concurrent_executions {
                return Err(ForgeError::ConcurrencyLimitReached {
                    active: active.len(),
                });
            }
            active.insert(execution.id.clone(), execution.clone());
        }
        {
            let mut flags = self.cancel_flags.write().map_err(|_| ForgeError::LockError)?;
            flags.insert(execution.id.clone(), Arc::clone(&cancel));
        }

        self.emit(ForgeEvent::ExecutionStarted {
            execution_id: execution.id.clone(),
            proposal_id: proposal.id.clone(),
            at: Utc::now(),
        });

        execution.log_line(format!(
            "execution {} started for proposal {}",
            execution.id, proposal.id
        ));

        let outcome = self.run(proposal, &mut execution, &cancel).await;
        execution.completed_at = Some(Utc::now());

        match outcome {
            Ok(()) => {
                execution.status = ExecutionStatus::Success;
                execution.log_line("execution completed");
                info!(execution_id = %execution.id, "execution completed");
                self.emit(ForgeEvent::ExecutionCompleted {
                    execution_id: execution.id.clone(),
                    proposal_id: proposal.id.clone(),
                    at: Utc::now(),
                });
            }
            Err((reason, checkpoint, created_ids)) => {
                execution.status = ExecutionStatus::Failed;
                execution.log_line(format!("execution failed: {reason}"));
                warn!(execution_id = %execution.id, reason = %reason, "execution failed");
                self.emit(ForgeEvent::ExecutionFailed {
                    execution_id: execution.id.clone(),
                    proposal_id: proposal.id.clone(),
                    reason: reason.clone(),
                    at: Utc::now(),
                });

                let attempt = self
                    .run_rollback(proposal, &mut execution, &checkpoint, &created_ids)
                    .await;
                let succeeded = attempt.succeeded;
                let detail = attempt.detail.clone();
                execution.rollback = Some(attempt);
                if succeeded {
                    execution.status = ExecutionStatus::RolledBack;
                    self.emit(ForgeEvent::RollbackSucceeded {
                        execution_id: execution.id.clone(),
                        proposal_id: proposal.id.clone(),
                        at: Utc::now(),
                    });
                } else {
                    self.emit(ForgeEvent::RollbackFailed {
                        execution_id: execution.id.clone(),
                        proposal_id: proposal.id.clone(),
                        reason: detail,
                        at: Utc::now(),
                    });
                }
            }
        }

        self.retire(&execution)?;
        Ok(execution)
    }

    /// Checkpoint, dispatch, and post-dispatch cancellation check.
    ///
    /// Failure carries what the rollback needs: the reason, the checkpoint
    /// and the ids of records created before the failure.
    async fn run(
        &self,
        proposal: &BlueprintProposal,
        execution: &mut ForgeExecution,
        cancel: &AtomicBool,
    ) -> Result<(), (String, Checkpoint, Vec<RecordId>)> {
        let checkpoint = match self.checkpoint(proposal).await {
            Ok(checkpoint) => checkpoint,
            Err(error) => {
                return Err((
                    format!("checkpoint failed: {error}"),
                    Checkpoint::default(),
                    Vec::new(),
                ))
            }
        };
        execution.log_line(format!(
            "checkpoint captured: {} record(s)",
            checkpoint.records.len()
        ));

        execution.status = ExecutionStatus::Running;
        match self.active.write() {
            Ok(mut active) => {
                if let Some(entry) = active.get_mut(&execution.id) {
                    entry.status = ExecutionStatus::Running;
                }
            }
            Err(_) => {
                return Err((
                    ForgeError::LockError.to_string(),
                    checkpoint,
                    Vec::new(),
                ))
            }
        }

        let applier = match self.appliers.read() {
            Ok(appliers) => appliers.get(&proposal.target_component).cloned(),
            Err(_) => {
                return Err((
                    ForgeError::LockError.to_string(),
                    checkpoint,
                    Vec::new(),
                ))
            }
        };
        let applier = match applier {
            Some(applier) => applier,
            None => {
                return Err((
                    format!("no applier for component {}", proposal.target_component),
                    checkpoint,
                    Vec::new(),
                ))
            }
        };

        let mut created_ids = Vec::new();
        let result = {
            let mut ctx = ApplierContext {
                changes: &mut execution.changes,
                log: &mut execution.log,
                created_ids: &mut created_ids,
                checkpoint: &checkpoint,
                sandbox_first: self.config.sandbox_first,
                cancel,
            };
            applier.apply(proposal, &mut ctx).await
        };

        match result {
            Ok(()) if cancel.load(Ordering::SeqCst) => {
                Err(("execution cancelled".into(), checkpoint, created_ids))
            }
            Ok(()) => Ok(()),
            Err(error) => Err((error.to_string(), checkpoint, created_ids)),
        }
    }

    /// Before-states of every record the change specification will touch.
    async fn checkpoint(&self, proposal: &BlueprintProposal) -> Result<Checkpoint, ForgeError> {
        let mut records = Vec::new();
        if let Some(intent) = proposal.sculpt_intent() {
            for id in &intent.targets {
                if let Some(record) = self.store.get(id).await? {
                    records.push(record);
                }
            }
        }
        Ok(Checkpoint::capture(records))
    }

    /// Drive the proposal's rollback plan.
    async fn run_rollback(
        &self,
        proposal: &BlueprintProposal,
        execution: &mut ForgeExecution,
        checkpoint: &Checkpoint,
        created_ids: &[RecordId],
    ) -> RollbackAttempt {
        let mut succeeded = true;
        let mut notes: Vec<String> = Vec::new();

        match proposal.rollback_plan.strategy {
            RollbackStrategy::Revert => {
                for id in created_ids {
                    match self.store.delete(id).await {
                        Ok(()) => {}
                        // A record that never landed needs no removal.
                        Err(ForgeError::NotFound(_)) => {}
                        Err(error) => {
                            succeeded = false;
                            notes.push(format!("failed to remove created record {id}: {error}"));
                        }
                    }
                }
                for record in &checkpoint.records {
                    if let Err(error) = self.store.put(record.clone()).await {
                        succeeded = false;
                        notes.push(format!("failed to restore record {}: {error}", record.id));
                    }
                }
                if succeeded {
                    notes.push(format!(
                        "restored {} record(s) from checkpoint",
                        checkpoint.records.len()
                    ));
                }
            }
            RollbackStrategy::Compensate | RollbackStrategy::Adapt => {
                for step in &proposal.rollback_plan.steps {
                    execution.log_line(format!("compensation: {step}"));
                }
                notes.push(format!(
                    "ran {} compensation step(s)",
                    proposal.rollback_plan.steps.len()
                ));
            }
        }

        if succeeded {
            // The change set is withdrawn; the observable state matches the
            // pre-execution snapshot.
            execution.changes.clear();
        }

        RollbackAttempt {
            succeeded,
            detail: notes.join("; "),
            completed_at: Utc::now(),
        }
    }

    /// Move a finished execution from the active set into bounded history.
    fn retire(&self, execution: &ForgeExecution) -> Result<(), ForgeError> {
        {
            let mut active = self.active.write().map_err(|_| ForgeError::LockError)?;
            active.remove(&execution.id);
        }
        {
            let mut flags = self.cancel_flags.write().map_err(|_| ForgeError::LockError)?;
            flags.remove(&execution.id);
        }
        let mut history = self.history.write().map_err(|_| ForgeError::LockError)?;
        history.push_back(execution.clone());
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
        Ok(())
    }

    /// Events are observability; a sink failure is reported, never fatal to
    /// the execution that raised it.
    fn emit(&self, event: ForgeEvent) {
        if let Err(error) = self.events.publish(event) {
            warn!(error = %error, "event publish failed");
        }
    }
}
