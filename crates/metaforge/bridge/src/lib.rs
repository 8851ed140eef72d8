#![deny(unsafe_code)]
//! Reflexive bridge: watches memory activity and proposes follow-up sculpt
//! operations.
//!
//! Store, query and consolidation notifications run a set of opportunity
//! detectors; surviving candidates are shaped into blueprint proposals by
//! the configured strategy and submitted to the engine, throttled by a
//! per-agent cooldown.

pub mod detectors;
pub mod strategy;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use metaforge_engine::MetaForgingEngine;
use metaforge_evaluator::ProposalEvaluator;
use metaforge_store::{MemoryStore, RecordQuery};
use metaforge_types::{
    BlueprintProposal, ForgeConfig, ForgeError, MemoryRecord, ProposalId, RecordId, RiskLevel,
    RollbackPlan,
};

pub use detectors::OpportunityCandidate;
pub use strategy::ProposalStrategy;

const COOLDOWN_TABLE_LIMIT: usize = 1024;
const HIT_TABLE_LIMIT: usize = 1024;

/// Detector thresholds and throttles, projected from the shared
/// configuration.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub merge_threshold: usize,
    pub prune_age_threshold_secs: i64,
    pub preserve_relevance_threshold: usize,
    pub proposal_cooldown_secs: i64,
    pub auto_approval_risk_threshold: f64,
    /// Minimum content-token overlap for the relink detector.
    pub relink_overlap_threshold: f64,
    /// Upper bound on candidates submitted per notification.
    pub max_candidates_per_event: usize,
}

impl From<&ForgeConfig> for BridgeConfig {
    fn from(config: &ForgeConfig) -> Self {
        Self {
            merge_threshold: config.merge_threshold,
            prune_age_threshold_secs: config.prune_age_threshold_secs,
            preserve_relevance_threshold: config.preserve_relevance_threshold,
            proposal_cooldown_secs: config.proposal_cooldown_secs,
            auto_approval_risk_threshold: config.auto_approval_risk_threshold,
            relink_overlap_threshold: 0.3,
            max_candidates_per_event: 3,
        }
    }
}

/// Observes memory activity and feeds candidate proposals to the engine.
pub struct ReflexiveBridge {
    engine: Arc<MetaForgingEngine>,
    store: Arc<dyn MemoryStore>,
    evaluator: ProposalEvaluator,
    strategy: ProposalStrategy,
    config: BridgeConfig,
    /// Per-agent instant of the last submitted proposal.
    cooldowns: Mutex<HashMap<String, DateTime<Utc>>>,
    /// Query-hit counters feeding the preserve detector.
    query_hits: Mutex<HashMap<RecordId, usize>>,
}

impl ReflexiveBridge {
    pub fn new(
        engine: Arc<MetaForgingEngine>,
        strategy: ProposalStrategy,
    ) -> Result<Self, ForgeError> {
        let store = Arc::clone(engine.store());
        let config = BridgeConfig::from(&engine.config()?);
        Ok(Self {
            engine,
            store,
            evaluator: ProposalEvaluator::new(),
            strategy,
            config,
            cooldowns: Mutex::new(HashMap::new()),
            query_hits: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// A record was stored: look for merge and relink opportunities.
    pub async fn on_store(&self, record: &MemoryRecord) -> Result<Vec<ProposalId>, ForgeError> {
        let peers = self
            .store
            .query(&record.agent_id, &RecordQuery::all())
            .await
            .map_err(|error| ForgeError::DetectorError(error.to_string()))?;

        let mut candidates = Vec::new();
        if let Some(candidate) =
            detectors::merge_opportunity(record, &peers, self.config.merge_threshold)
        {
            candidates.push(candidate);
        }
        if let Some(candidate) =
            detectors::relink_opportunity(record, &peers, self.config.relink_overlap_threshold)
        {
            candidates.push(candidate);
        }
        self.submit_candidates(&record.agent_id, candidates).await
    }

    /// A query returned records: count hits for the preserve detector and
    /// look for stale prune candidates among the results.
    pub async fn on_query(
        &self,
        agent_id: &str,
        returned: &[MemoryRecord],
    ) -> Result<Vec<ProposalId>, ForgeError> {
        let now = Utc::now();
        let frequent = self.bump_hits(returned, now)?;

        let mut candidates = Vec::new();
        if let Some(candidate) = detectors::preserve_opportunity(
            agent_id,
            frequent,
            self.config.preserve_relevance_threshold,
        ) {
            candidates.push(candidate);
        }
        if let Some(candidate) = detectors::prune_opportunity(
            agent_id,
            returned,
            chrono::Duration::seconds(self.config.prune_age_threshold_secs),
            now,
        ) {
            candidates.push(candidate);
        }
        self.submit_candidates(agent_id, candidates).await
    }

    /// A consolidation finished: relabel bare merge results and sweep for
    /// stale records.
    pub async fn on_consolidate(
        &self,
        agent_id: &str,
        result_ids: &[RecordId],
    ) -> Result<Vec<ProposalId>, ForgeError> {
        let mut merged = Vec::new();
        for id in result_ids {
            match self.store.get(id).await {
                Ok(Some(record)) => merged.push(record),
                Ok(None) => {}
                Err(error) => {
                    warn!(id = %id, error = %error, "relabel detector could not load record");
                }
            }
        }

        let mut candidates = Vec::new();
        if let Some(candidate) = detectors::relabel_opportunity(agent_id, &merged) {
            candidates.push(candidate);
        }

        match self.store.query(agent_id, &RecordQuery::all()).await {
            Ok(all) => {
                if let Some(candidate) = detectors::prune_opportunity(
                    agent_id,
                    &all,
                    chrono::Duration::seconds(self.config.prune_age_threshold_secs),
                    Utc::now(),
                ) {
                    candidates.push(candidate);
                }
            }
            Err(error) => {
                warn!(agent_id, error = %error, "prune sweep query failed");
            }
        }

        self.submit_candidates(agent_id, candidates).await
    }

    /// Record query hits; returns the ids that just crossed the relevance
    /// threshold (and resets their counters).
    fn bump_hits(
        &self,
        returned: &[MemoryRecord],
        now: DateTime<Utc>,
    ) -> Result<Vec<RecordId>, ForgeError> {
        let mut hits = self.query_hits.lock().map_err(|_| ForgeError::LockError)?;
        let mut frequent = Vec::new();
        for record in returned {
            if record.is_protected_at(now) {
                continue;
            }
            let count = hits.entry(record.id.clone()).or_insert(0);
            *count += 1;
            if *count >= self.config.preserve_relevance_threshold {
                frequent.push(record.id.clone());
            }
        }
        for id in &frequent {
            hits.remove(id);
        }
        if hits.len() > HIT_TABLE_LIMIT {
            // Drop the cold half of the table.
            let mut counts: Vec<usize> = hits.values().copied().collect();
            counts.sort_unstable();
            let cutoff = counts[counts.len() / 2];
            hits.retain(|_, count| *count > cutoff);
        }
        Ok(frequent)
    }

    fn in_cooldown(&self, agent_id: &str, now: DateTime<Utc>) -> Result<bool, ForgeError> {
        let cooldowns = self.cooldowns.lock().map_err(|_| ForgeError::LockError)?;
        Ok(cooldowns.get(agent_id).is_some_and(|last| {
            now - *last < chrono::Duration::seconds(self.config.proposal_cooldown_secs)
        }))
    }

    fn touch_cooldown(&self, agent_id: &str, now: DateTime<Utc>) -> Result<(), ForgeError> {
        let mut cooldowns = self.cooldowns.lock().map_err(|_| ForgeError::LockError)?;
        cooldowns.insert(agent_id.to_string(), now);
        if cooldowns.len() > COOLDOWN_TABLE_LIMIT {
            if let Some(oldest) = cooldowns
                .iter()
                .min_by_key(|(_, at)| **at)
                .map(|(agent, _)| agent.clone())
            {
                cooldowns.remove(&oldest);
            }
        }
        Ok(())
    }

    /// Shape, pre-score and submit the candidates for one notification.
    async fn submit_candidates(
        &self,
        agent_id: &str,
        candidates: Vec<OpportunityCandidate>,
    ) -> Result<Vec<ProposalId>, ForgeError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        if self.in_cooldown(agent_id, now)? {
            debug!(agent_id, "candidates suppressed by cooldown");
            return Ok(Vec::new());
        }

        let mut submitted = Vec::new();
        for candidate in candidates
            .into_iter()
            .take(self.config.max_candidates_per_event)
        {
            let proposal = self.shape_for_submission(candidate);
            match self.engine.submit(proposal).await {
                Ok(id) => {
                    info!(agent_id, proposal_id = %id, "bridge proposal submitted");
                    submitted.push(id);
                }
                Err(error) => {
                    debug!(agent_id, error = %error, "bridge proposal rejected at submission");
                }
            }
        }
        if !submitted.is_empty() {
            self.touch_cooldown(agent_id, now)?;
        }
        Ok(submitted)
    }

    /// Apply the strategy, then decide the risk shaping from the estimated
    /// risk axis: candidates scoring at or above the auto-approval bar are
    /// marked safe with a plain revert plan, the rest keep the strategy's
    /// grading and follow the standard routing.
    fn shape_for_submission(&self, candidate: OpportunityCandidate) -> BlueprintProposal {
        let mut proposal = self.strategy.shape(candidate);
        let estimated = self
            .evaluator
            .evaluate(&proposal, self.engine.purpose())
            .axes
            .risk;
        if estimated >= self.config.auto_approval_risk_threshold {
            proposal.risk = RiskLevel::Safe;
            proposal.rollback_plan = RollbackPlan::revert();
        }
        proposal
    }
}
