//! The engine proper: queue, validation, routing and dispatch.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use metaforge_evaluator::ProposalEvaluator;
use metaforge_executor::{ExecutorConfig, ForgeExecutor};
use metaforge_sculptor::{HookRegistry, MemorySculptor, SculptorConfig};
use metaforge_store::MemoryStore;
use metaforge_types::{
    BlueprintProposal, EvaluationResult, EventSink, FinalDecision, ForgeConfig, ForgeError,
    ForgeEvent, ProposalDraft, ProposalId, PurposeCore, RiskLevel, SpecPayload, TargetComponent,
};

use crate::bus::{Chronicler, EventBus};

const EVALUATION_HISTORY_LIMIT: usize = 512;

struct HeldProposal {
    proposal: BlueprintProposal,
    evaluation: EvaluationResult,
}

/// Wires a store, purpose core and configuration into a ready engine.
pub struct EngineBuilder {
    store: Arc<dyn MemoryStore>,
    purpose: PurposeCore,
    config: ForgeConfig,
    hooks: Arc<HookRegistry>,
    chronicler: Option<Arc<dyn Chronicler>>,
}

impl EngineBuilder {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            purpose: PurposeCore::default(),
            config: ForgeConfig::default(),
            hooks: Arc::new(HookRegistry::new()),
            chronicler: None,
        }
    }

    pub fn purpose(mut self, purpose: PurposeCore) -> Self {
        self.purpose = purpose;
        self
    }

    pub fn config(mut self, config: ForgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn chronicler(mut self, chronicler: Arc<dyn Chronicler>) -> Self {
        self.chronicler = Some(chronicler);
        self
    }

    pub fn build(self) -> Arc<MetaForgingEngine> {
        let bus = Arc::new(EventBus::new());
        if let Some(chronicler) = self.chronicler {
            // A freshly built bus has never been locked by anyone else.
            if bus.set_chronicler(chronicler).is_err() {
                warn!("chronicler could not be attached");
            }
        }
        let sculptor = Arc::new(MemorySculptor::with_config(
            Arc::clone(&self.store),
            Arc::clone(&self.hooks),
            SculptorConfig {
                max_memories_per_operation: self.config.max_memories_per_operation,
                validate_targets: true,
            },
        ));
        let executor = Arc::new(ForgeExecutor::new(
            Arc::clone(&self.store),
            Arc::clone(&sculptor),
            Arc::clone(&bus) as Arc<dyn EventSink>,
            ExecutorConfig {
                max_concurrent_executions: self.config.max_concurrent_executions,
                sandbox_first: self.config.sandbox_first,
                ..ExecutorConfig::default()
            },
        ));
        Arc::new(MetaForgingEngine {
            store: self.store,
            sculptor,
            evaluator: ProposalEvaluator::new(),
            executor,
            purpose: self.purpose,
            config: RwLock::new(self.config),
            queue: Mutex::new(VecDeque::new()),
            held: Mutex::new(HashMap::new()),
            governance_cleared: Mutex::new(HashSet::new()),
            evaluations: Mutex::new(VecDeque::new()),
            bus,
            draining: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// Owns the proposal queue and drives proposals from submission to a
/// terminal state.
pub struct MetaForgingEngine {
    store: Arc<dyn MemoryStore>,
    sculptor: Arc<MemorySculptor>,
    evaluator: ProposalEvaluator,
    executor: Arc<ForgeExecutor>,
    purpose: PurposeCore,
    config: RwLock<ForgeConfig>,
    queue: Mutex<VecDeque<BlueprintProposal>>,
    held: Mutex<HashMap<ProposalId, HeldProposal>>,
    /// Proposals governance has cleared for dispatch; they bypass routing on
    /// their next pass through the queue.
    governance_cleared: Mutex<HashSet<ProposalId>>,
    evaluations: Mutex<VecDeque<EvaluationResult>>,
    bus: Arc<EventBus>,
    draining: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MetaForgingEngine {
    pub fn builder(store: Arc<dyn MemoryStore>) -> EngineBuilder {
        EngineBuilder::new(store)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn sculptor(&self) -> &Arc<MemorySculptor> {
        &self.sculptor
    }

    pub fn executor(&self) -> &Arc<ForgeExecutor> {
        &self.executor
    }

    pub fn purpose(&self) -> &PurposeCore {
        &self.purpose
    }

    pub fn config(&self) -> Result<ForgeConfig, ForgeError> {
        let config = self.config.read().map_err(|_| ForgeError::LockError)?;
        Ok(config.clone())
    }

    pub fn queue_len(&self) -> Result<usize, ForgeError> {
        let queue = self.queue.lock().map_err(|_| ForgeError::LockError)?;
        Ok(queue.len())
    }

    /// Ids of proposals held for governance review.
    pub fn held_ids(&self) -> Result<Vec<ProposalId>, ForgeError> {
        let held = self.held.lock().map_err(|_| ForgeError::LockError)?;
        Ok(held.keys().cloned().collect())
    }

    /// Snapshot of a held proposal, for session creation.
    pub fn held_proposal(&self, id: &ProposalId) -> Result<Option<BlueprintProposal>, ForgeError> {
        let held = self.held.lock().map_err(|_| ForgeError::LockError)?;
        Ok(held.get(id).map(|h| h.proposal.clone()))
    }

    /// The evaluation that put a proposal into the holding set; voters use
    /// it as scoring context.
    pub fn held_evaluation(&self, id: &ProposalId) -> Result<Option<EvaluationResult>, ForgeError> {
        let held = self.held.lock().map_err(|_| ForgeError::LockError)?;
        Ok(held.get(id).map(|h| h.evaluation.clone()))
    }

    pub fn evaluation_history(&self) -> Result<Vec<EvaluationResult>, ForgeError> {
        let history = self.evaluations.lock().map_err(|_| ForgeError::LockError)?;
        Ok(history.iter().cloned().collect())
    }

    /// Validate and enqueue a proposal, then start a drain pass.
    pub async fn submit(
        self: &Arc<Self>,
        proposal: BlueprintProposal,
    ) -> Result<ProposalId, ForgeError> {
        if let Err(error) = self.validate(&proposal) {
            self.emit(ForgeEvent::ProposalRejected {
                proposal_id: proposal.id.clone(),
                reason: error.to_string(),
                at: Utc::now(),
            });
            return Err(error);
        }
        let id = proposal.id.clone();
        {
            let mut queue = self.queue.lock().map_err(|_| ForgeError::LockError)?;
            queue.push_back(proposal);
        }
        self.emit(ForgeEvent::ProposalQueued {
            proposal_id: id.clone(),
            at: Utc::now(),
        });
        info!(proposal_id = %id, "proposal queued");
        self.spawn_drain()?;
        Ok(id)
    }

    /// Construct and submit a proposal on the engine's own behalf.
    pub async fn propose_self_improvement(
        self: &Arc<Self>,
        draft: ProposalDraft,
    ) -> Result<ProposalId, ForgeError> {
        self.submit(draft.into_proposal("engine")).await
    }

    /// Remove a queued or held proposal before it runs.
    pub fn cancel(&self, proposal_id: &ProposalId) -> Result<(), ForgeError> {
        let removed_from_queue = {
            let mut queue = self.queue.lock().map_err(|_| ForgeError::LockError)?;
            let before = queue.len();
            queue.retain(|p| &p.id != proposal_id);
            queue.len() < before
        };
        let removed_from_held = {
            let mut held = self.held.lock().map_err(|_| ForgeError::LockError)?;
            held.remove(proposal_id).is_some()
        };
        if removed_from_queue || removed_from_held {
            self.emit(ForgeEvent::ProposalCancelled {
                proposal_id: proposal_id.clone(),
                at: Utc::now(),
            });
            Ok(())
        } else {
            Err(ForgeError::NotFound(proposal_id.to_string()))
        }
    }

    /// Replace the configuration.
    pub fn update_config(&self, config: ForgeConfig) -> Result<(), ForgeError> {
        {
            let mut current = self.config.write().map_err(|_| ForgeError::LockError)?;
            *current = config;
        }
        self.emit(ForgeEvent::ConfigUpdated { at: Utc::now() });
        Ok(())
    }

    /// Finalise a held proposal with a governance decision.
    ///
    /// Approval re-enters the dispatch path; rejection and deferral are
    /// terminal.
    pub fn approve_with_governance(
        self: &Arc<Self>,
        proposal_id: &ProposalId,
        decision: FinalDecision,
    ) -> Result<(), ForgeError> {
        let held = {
            let mut held = self.held.lock().map_err(|_| ForgeError::LockError)?;
            held.remove(proposal_id)
                .ok_or_else(|| ForgeError::NotFound(proposal_id.to_string()))?
        };

        match decision {
            FinalDecision::Approved => {
                info!(proposal_id = %proposal_id, "governance approved proposal");
                {
                    let mut cleared = self
                        .governance_cleared
                        .lock()
                        .map_err(|_| ForgeError::LockError)?;
                    cleared.insert(proposal_id.clone());
                }
                {
                    let mut queue = self.queue.lock().map_err(|_| ForgeError::LockError)?;
                    queue.push_front(held.proposal);
                }
                self.spawn_drain()?;
            }
            FinalDecision::Rejected => {
                self.emit(ForgeEvent::ProposalRejected {
                    proposal_id: proposal_id.clone(),
                    reason: "rejected by governance".into(),
                    at: Utc::now(),
                });
            }
            FinalDecision::Deferred => {
                self.emit(ForgeEvent::ProposalDeferred {
                    proposal_id: proposal_id.clone(),
                    at: Utc::now(),
                });
            }
        }
        Ok(())
    }

    /// Await until no drain pass or execution task is in flight.
    ///
    /// Proposals parked in the queue because the executor is saturated do
    /// not count as in-flight work; they move again on the next dispatch.
    pub async fn quiesce(&self) -> Result<(), ForgeError> {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut tasks = self.tasks.lock().map_err(|_| ForgeError::LockError)?;
                tasks.drain(..).collect()
            };
            if handles.is_empty() {
                let idle = !self.draining.load(Ordering::SeqCst)
                    && self.executor.active_count()? == 0;
                if idle {
                    break;
                }
                tokio::task::yield_now().await;
                continue;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
        Ok(())
    }

    fn validate(&self, proposal: &BlueprintProposal) -> Result<(), ForgeError> {
        if proposal.proposer.trim().is_empty() {
            return Err(ForgeError::InvalidProposal("proposer is empty".into()));
        }
        let config = self.config.read().map_err(|_| ForgeError::LockError)?;
        if config.purpose_lock_enabled
            && proposal.target_component == TargetComponent::Purpose
            && proposal.change_type == metaforge_types::ChangeType::Modify
        {
            return Err(ForgeError::InvalidProposal(
                "purpose lock is enabled: purpose modifications are banned".into(),
            ));
        }
        if !(0.0..=1.0).contains(&proposal.priority)
            || !(0.0..=1.0).contains(&proposal.purpose_alignment)
            || !(-1.0..=1.0).contains(&proposal.expected_impact)
        {
            return Err(ForgeError::InvalidProposal(
                "priority, purpose alignment or expected impact out of range".into(),
            ));
        }
        match (&proposal.target_component, &proposal.specification.payload) {
            (TargetComponent::Memory, SpecPayload::Sculpt(_)) => {}
            (TargetComponent::Memory, _) => {
                return Err(ForgeError::InvalidProposal(
                    "memory proposals must carry a sculpt payload".into(),
                ));
            }
            (_, SpecPayload::Sculpt(_)) => {
                return Err(ForgeError::InvalidProposal(
                    "only memory proposals may carry a sculpt payload".into(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    fn requires_special_approval(
        &self,
        proposal: &BlueprintProposal,
        config: &ForgeConfig,
    ) -> bool {
        if config.requires_guild_consensus.contains(&proposal.change_type) {
            return true;
        }
        if config
            .human_oversight_required
            .contains(&proposal.target_component)
        {
            return true;
        }
        if proposal.risk == RiskLevel::Experimental {
            return true;
        }
        if proposal.impact_level() >= config.impact_threshold {
            return true;
        }
        if let Some(intent) = proposal.sculpt_intent() {
            if config
                .always_require_reflection
                .contains(&intent.operation.kind())
            {
                return true;
            }
        }
        false
    }

    fn push_evaluation(&self, evaluation: EvaluationResult) -> Result<(), ForgeError> {
        let mut history = self.evaluations.lock().map_err(|_| ForgeError::LockError)?;
        history.push_back(evaluation);
        while history.len() > EVALUATION_HISTORY_LIMIT {
            history.pop_front();
        }
        Ok(())
    }

    fn hold(
        &self,
        proposal: BlueprintProposal,
        evaluation: EvaluationResult,
    ) -> Result<(), ForgeError> {
        let impact = proposal.impact_level();
        let id = proposal.id.clone();
        {
            let mut held = self.held.lock().map_err(|_| ForgeError::LockError)?;
            held.insert(
                id.clone(),
                HeldProposal {
                    proposal,
                    evaluation,
                },
            );
        }
        self.emit(ForgeEvent::SpecialApprovalRequired {
            proposal_id: id,
            impact,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Start a drain pass on a background task.
    pub fn spawn_drain(self: &Arc<Self>) -> Result<(), ForgeError> {
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if let Err(error) = engine.drain_boxed().await {
                warn!(error = %error, "drain pass failed");
            }
        });
        let mut tasks = self.tasks.lock().map_err(|_| ForgeError::LockError)?;
        tasks.push(handle);
        Ok(())
    }

    /// Type-erased drain future, so completed executions can re-enter the
    /// loop from their own tasks.
    fn drain_boxed(self: Arc<Self>) -> BoxFuture<'static, Result<(), ForgeError>> {
        Box::pin(async move { self.drain().await })
    }

    /// Single-producer queue drain. Only one pass runs at a time; submitters
    /// and finished executions trigger further passes.
    pub async fn drain(self: Arc<Self>) -> Result<(), ForgeError> {
        if self.draining.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let outcome = self.drain_pass().await;
        self.draining.store(false, Ordering::SeqCst);
        outcome?;

        // A submit may have raced the flag while this pass was finishing.
        let has_work = {
            let queue = self.queue.lock().map_err(|_| ForgeError::LockError)?;
            !queue.is_empty()
        };
        let capacity = self.executor.active_count()? < self.config()?.max_concurrent_executions;
        if has_work && capacity {
            self.spawn_drain()?;
        }
        Ok(())
    }

    async fn drain_pass(self: &Arc<Self>) -> Result<(), ForgeError> {
        self.emit(ForgeEvent::ProcessingStarted { at: Utc::now() });
        let mut processed = 0usize;

        loop {
            let proposal = {
                let mut queue = self.queue.lock().map_err(|_| ForgeError::LockError)?;
                match queue.pop_front() {
                    Some(proposal) => proposal,
                    None => break,
                }
            };
            let config = self.config()?;
            let cleared = {
                let cleared = self
                    .governance_cleared
                    .lock()
                    .map_err(|_| ForgeError::LockError)?;
                cleared.contains(&proposal.id)
            };

            let evaluation = self.evaluator.evaluate(&proposal, &self.purpose);
            self.push_evaluation(evaluation.clone())?;
            self.emit(ForgeEvent::ProposalEvaluated {
                proposal_id: proposal.id.clone(),
                approved: evaluation.approved,
                overall: evaluation.overall,
                at: Utc::now(),
            });

            if !evaluation.approved {
                debug!(proposal_id = %proposal.id, "proposal not approved");
                self.emit(ForgeEvent::ProposalRejected {
                    proposal_id: proposal.id.clone(),
                    reason: evaluation.explanation.clone(),
                    at: Utc::now(),
                });
                processed += 1;
                continue;
            }

            if !cleared
                && (self.requires_special_approval(&proposal, &config)
                    || evaluation.overall < config.auto_approval_threshold)
            {
                self.hold(proposal, evaluation)?;
                processed += 1;
                continue;
            }

            if self.executor.active_count()? >= config.max_concurrent_executions {
                // No capacity: put the head back and stop this pass.
                let mut queue = self.queue.lock().map_err(|_| ForgeError::LockError)?;
                queue.push_front(proposal);
                break;
            }

            {
                let mut cleared = self
                    .governance_cleared
                    .lock()
                    .map_err(|_| ForgeError::LockError)?;
                cleared.remove(&proposal.id);
            }
            self.spawn_execution(proposal, evaluation)?;
            processed += 1;
        }

        self.emit(ForgeEvent::ProcessingCompleted {
            processed,
            at: Utc::now(),
        });
        Ok(())
    }

    fn spawn_execution(
        self: &Arc<Self>,
        proposal: BlueprintProposal,
        evaluation: EvaluationResult,
    ) -> Result<(), ForgeError> {
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            match engine.executor.execute(&proposal, &evaluation).await {
                Ok(execution) => {
                    debug!(
                        execution_id = %execution.id,
                        status = %execution.status,
                        "execution finished"
                    );
                }
                Err(ForgeError::ConcurrencyLimitReached { .. }) => {
                    // Raced another dispatch; retry on the next pass.
                    if let Err(error) = engine.requeue_front(proposal) {
                        warn!(error = %error, "could not requeue raced proposal");
                    }
                }
                Err(error) => {
                    warn!(proposal_id = %proposal.id, error = %error, "execution dispatch failed");
                }
            }
            // A slot freed (or the queue changed); keep the queue moving.
            if let Err(error) = engine.spawn_drain() {
                warn!(error = %error, "could not continue the queue");
            }
        });
        let mut tasks = self.tasks.lock().map_err(|_| ForgeError::LockError)?;
        tasks.push(handle);
        Ok(())
    }

    /// Put a dispatched-but-not-started proposal back at the queue head,
    /// keeping its governance clearance.
    fn requeue_front(&self, proposal: BlueprintProposal) -> Result<(), ForgeError> {
        {
            let mut cleared = self
                .governance_cleared
                .lock()
                .map_err(|_| ForgeError::LockError)?;
            cleared.insert(proposal.id.clone());
        }
        let mut queue = self.queue.lock().map_err(|_| ForgeError::LockError)?;
        queue.push_front(proposal);
        Ok(())
    }

    /// Events are observability; a sink failure is reported, never fatal to
    /// the operation that raised it.
    fn emit(&self, event: ForgeEvent) {
        if let Err(error) = self.bus.publish(event) {
            warn!(error = %error, "event publish failed");
        }
    }
}
