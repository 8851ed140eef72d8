#![deny(unsafe_code)]
//! Governance session controller: time-bounded weighted votes over
//! high-impact proposals.
//!
//! A session resolves when one side's weighted fraction crosses the
//! consensus threshold with quorum met, when every eligible member has
//! voted, or at the deadline. Completed sessions notify the engine through
//! `approve_with_governance` and move to the archive with their vote trail.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use metaforge_engine::MetaForgingEngine;
use metaforge_types::{
    BlueprintProposal, FinalDecision, ForgeError, ForgeEvent, SessionId, SessionStatus, Urgency,
    Vote, VoteChoice, VotingSession,
};

const ARCHIVE_LIMIT: usize = 256;

/// An eligible voter.
///
/// `evaluate_proposal` is the member's own judgement, used when the
/// controller polls members instead of waiting for external votes.
pub trait GovernanceMember: Send + Sync {
    fn member_id(&self) -> String;
    fn vote_weight(&self) -> f64;
    fn evaluate_proposal(&self, proposal: &BlueprintProposal) -> (VoteChoice, f64);
}

/// Creates, collects and resolves voting sessions for held proposals.
pub struct GovernanceController {
    engine: Arc<MetaForgingEngine>,
    members: RwLock<Vec<Arc<dyn GovernanceMember>>>,
    sessions: Mutex<HashMap<SessionId, VotingSession>>,
    archive: Mutex<Vec<VotingSession>>,
}

impl GovernanceController {
    pub fn new(engine: Arc<MetaForgingEngine>) -> Self {
        Self {
            engine,
            members: RwLock::new(Vec::new()),
            sessions: Mutex::new(HashMap::new()),
            archive: Mutex::new(Vec::new()),
        }
    }

    pub fn register_member(&self, member: Arc<dyn GovernanceMember>) -> Result<(), ForgeError> {
        let mut members = self.members.write().map_err(|_| ForgeError::LockError)?;
        let id = member.member_id();
        members.retain(|m| m.member_id() != id);
        members.push(member);
        Ok(())
    }

    pub fn member_count(&self) -> Result<usize, ForgeError> {
        let members = self.members.read().map_err(|_| ForgeError::LockError)?;
        Ok(members.len())
    }

    /// Open a session for a proposal, deriving urgency from its impact.
    pub fn open_session_for(&self, proposal: BlueprintProposal) -> Result<SessionId, ForgeError> {
        let urgency = proposal.urgency();
        self.open_session(proposal, urgency)
    }

    /// Open a session with the deadline computed from configuration and
    /// urgency.
    pub fn open_session(
        &self,
        proposal: BlueprintProposal,
        urgency: Urgency,
    ) -> Result<SessionId, ForgeError> {
        let config = self.engine.config()?;
        let window = config.voting_time_limit().num_seconds() as f64 * urgency.deadline_factor();
        let deadline = Utc::now() + chrono::Duration::seconds(window as i64);
        self.open_session_with_deadline(proposal, urgency, deadline)
    }

    /// Open a session with an explicit deadline.
    pub fn open_session_with_deadline(
        &self,
        proposal: BlueprintProposal,
        urgency: Urgency,
        deadline: DateTime<Utc>,
    ) -> Result<SessionId, ForgeError> {
        let config = self.engine.config()?;
        let eligible = self.member_count()?;
        let quorum = config.min_quorum.max(eligible.div_ceil(2));
        let session = VotingSession::new(
            proposal,
            quorum,
            config.consensus_threshold,
            urgency,
            deadline,
        );
        let session_id = session.id.clone();
        let proposal_id = session.proposal.id.clone();

        info!(
            session_id = %session_id,
            proposal_id = %proposal_id,
            quorum,
            "voting session opened"
        );
        {
            let mut sessions = self.sessions.lock().map_err(|_| ForgeError::LockError)?;
            sessions.insert(session_id.clone(), session);
        }
        self.emit(ForgeEvent::SessionOpened {
            session_id: session_id.clone(),
            proposal_id,
            at: Utc::now(),
        });
        Ok(session_id)
    }

    pub fn session(&self, id: &SessionId) -> Result<Option<VotingSession>, ForgeError> {
        let sessions = self.sessions.lock().map_err(|_| ForgeError::LockError)?;
        Ok(sessions.get(id).cloned())
    }

    pub fn active_session_count(&self) -> Result<usize, ForgeError> {
        let sessions = self.sessions.lock().map_err(|_| ForgeError::LockError)?;
        Ok(sessions.len())
    }

    pub fn archive(&self) -> Result<Vec<VotingSession>, ForgeError> {
        let archive = self.archive.lock().map_err(|_| ForgeError::LockError)?;
        Ok(archive.clone())
    }

    /// Cast a vote on behalf of a registered member.
    ///
    /// A member's later vote supersedes the earlier one. Votes after the
    /// deadline are not counted; the session resolves from what was cast.
    pub fn cast_vote(
        &self,
        session_id: &SessionId,
        member_id: &str,
        choice: VoteChoice,
        confidence: f64,
    ) -> Result<SessionStatus, ForgeError> {
        let (weight, eligible) = {
            let members = self.members.read().map_err(|_| ForgeError::LockError)?;
            let weight = members
                .iter()
                .find(|m| m.member_id() == member_id)
                .map(|m| m.vote_weight())
                .ok_or_else(|| ForgeError::NotFound(format!("member {member_id}")))?;
            (weight, members.len())
        };

        let now = Utc::now();
        let resolved: Option<(VotingSession, FinalDecision)> = {
            let mut sessions = self.sessions.lock().map_err(|_| ForgeError::LockError)?;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| ForgeError::NotFound(session_id.to_string()))?;

            let decision = if session.is_expired_at(now) {
                // Votes after the deadline are not counted.
                debug!(session_id = %session_id, "vote arrived after the deadline");
                Some(Self::deadline_decision(session))
            } else {
                session.record_vote(Vote::new(member_id, choice, confidence, weight));
                self.emit(ForgeEvent::VoteRecorded {
                    session_id: session_id.clone(),
                    member_id: member_id.to_string(),
                    at: Utc::now(),
                });
                Self::threshold_decision(session, eligible)
            };
            decision.and_then(|d| sessions.remove(session_id).map(|s| (s, d)))
        };

        match resolved {
            Some((session, decision)) => {
                self.complete(session, decision)?;
                Ok(SessionStatus::Completed)
            }
            None => Ok(SessionStatus::InProgress),
        }
    }

    /// Poll every registered member for its judgement on a session's
    /// proposal. Stops as soon as the session resolves.
    pub fn collect_votes(&self, session_id: &SessionId) -> Result<SessionStatus, ForgeError> {
        let proposal = {
            let sessions = self.sessions.lock().map_err(|_| ForgeError::LockError)?;
            let session = sessions
                .get(session_id)
                .ok_or_else(|| ForgeError::NotFound(session_id.to_string()))?;
            session.proposal.clone()
        };
        let member_ids: Vec<String> = {
            let members = self.members.read().map_err(|_| ForgeError::LockError)?;
            members.iter().map(|m| m.member_id()).collect()
        };

        let mut status = SessionStatus::InProgress;
        for member_id in member_ids {
            let judgement = {
                let members = self.members.read().map_err(|_| ForgeError::LockError)?;
                members
                    .iter()
                    .find(|m| m.member_id() == member_id)
                    .map(|m| m.evaluate_proposal(&proposal))
            };
            let Some((choice, confidence)) = judgement else {
                continue;
            };
            status = self.cast_vote(session_id, &member_id, choice, confidence)?;
            if status != SessionStatus::InProgress {
                break;
            }
        }
        Ok(status)
    }

    /// Resolve every session whose deadline has passed.
    pub fn expire_stale_sessions(&self) -> Result<Vec<SessionId>, ForgeError> {
        let now = Utc::now();
        let expired: Vec<(VotingSession, FinalDecision)> = {
            let mut sessions = self.sessions.lock().map_err(|_| ForgeError::LockError)?;
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, s)| s.status == SessionStatus::InProgress && s.is_expired_at(now))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    sessions.remove(&id).map(|session| {
                        let decision = Self::deadline_decision(&session);
                        (session, decision)
                    })
                })
                .collect()
        };

        let mut resolved = Vec::new();
        for (session, decision) in expired {
            resolved.push(session.id.clone());
            warn!(session_id = %session.id, decision = %decision, "session expired");
            self.complete(session, decision)?;
        }
        Ok(resolved)
    }

    /// Consensus/quorum/all-voted resolution after a vote; `None` keeps the
    /// session open.
    fn threshold_decision(session: &VotingSession, eligible: usize) -> Option<FinalDecision> {
        let tally = session.tally();
        if session.quorum_met() {
            if tally.weighted_approval() >= session.consensus_threshold {
                return Some(FinalDecision::Approved);
            }
            if tally.weighted_rejection() >= session.consensus_threshold {
                return Some(FinalDecision::Rejected);
            }
        }
        if eligible > 0 && session.votes.len() >= eligible {
            return Some(Self::majority_decision(session));
        }
        None
    }

    /// Deadline resolution: weighted majority with quorum, deferred
    /// otherwise.
    fn deadline_decision(session: &VotingSession) -> FinalDecision {
        if session.quorum_met() {
            Self::majority_decision(session)
        } else {
            FinalDecision::Deferred
        }
    }

    fn majority_decision(session: &VotingSession) -> FinalDecision {
        let tally = session.tally();
        if tally.approve_weight > tally.reject_weight {
            FinalDecision::Approved
        } else if tally.reject_weight > tally.approve_weight {
            FinalDecision::Rejected
        } else {
            FinalDecision::Deferred
        }
    }

    /// Mark the session completed, archive it, notify the engine.
    fn complete(&self, mut session: VotingSession, decision: FinalDecision) -> Result<(), ForgeError> {
        session.status = SessionStatus::Completed;
        session.completed_at = Some(Utc::now());
        session.decision = Some(decision);
        let session_id = session.id.clone();
        let proposal_id = session.proposal.id.clone();

        info!(
            session_id = %session_id,
            proposal_id = %proposal_id,
            decision = %decision,
            "voting session completed"
        );
        {
            let mut archive = self.archive.lock().map_err(|_| ForgeError::LockError)?;
            archive.push(session);
            while archive.len() > ARCHIVE_LIMIT {
                archive.remove(0);
            }
        }
        self.emit(ForgeEvent::SessionCompleted {
            session_id,
            proposal_id: proposal_id.clone(),
            decision,
            at: Utc::now(),
        });

        if let Err(error) = self.engine.approve_with_governance(&proposal_id, decision) {
            // The proposal may have been cancelled while the vote ran.
            warn!(proposal_id = %proposal_id, error = %error, "engine refused governance decision");
        }
        Ok(())
    }

    /// Events are observability; a sink failure is reported, never fatal to
    /// the vote that raised it.
    fn emit(&self, event: ForgeEvent) {
        if let Err(error) = self.engine.bus().publish(event) {
            warn!(error = %error, "event publish failed");
        }
    }
}

/// Fixed-weight member that votes by a predefined rule; the simulated
/// counterpart of an external voter.
pub struct StaticMember {
    id: String,
    weight: f64,
    choice: VoteChoice,
    confidence: f64,
}

impl StaticMember {
    pub fn new(id: impl Into<String>, weight: f64, choice: VoteChoice, confidence: f64) -> Self {
        Self {
            id: id.into(),
            weight,
            choice,
            confidence,
        }
    }
}

impl GovernanceMember for StaticMember {
    fn member_id(&self) -> String {
        self.id.clone()
    }

    fn vote_weight(&self) -> f64 {
        self.weight
    }

    fn evaluate_proposal(&self, _proposal: &BlueprintProposal) -> (VoteChoice, f64) {
        (self.choice, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaforge_store::{InMemoryStore, MemoryStore};
    use metaforge_types::{
        ChangeSpecification, ChangeType, ForgeConfig, MemoryRecord, PurposeCore, RiskLevel,
        SculptOperation, SculptorIntent, TargetComponent,
    };

    async fn rig() -> (Arc<MetaForgingEngine>, GovernanceController, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let engine = MetaForgingEngine::builder(Arc::clone(&store) as Arc<dyn MemoryStore>)
            .purpose(PurposeCore::new("maintain coherent durable memory"))
            .config(ForgeConfig::default())
            .build();
        let controller = GovernanceController::new(Arc::clone(&engine));
        (engine, controller, store)
    }

    async fn held_merge_proposal(
        engine: &Arc<MetaForgingEngine>,
        store: &InMemoryStore,
    ) -> BlueprintProposal {
        let mut ids = Vec::new();
        for text in ["first", "second"] {
            let rec = MemoryRecord::text("agent-1", text);
            ids.push(rec.id.clone());
            store.put(rec).await.unwrap();
        }
        let intent = SculptorIntent::new("agent-1", ids, SculptOperation::merge());
        let proposal =
            BlueprintProposal::builder("tester", TargetComponent::Memory, ChangeType::Merge)
                .specification(ChangeSpecification::sculpt(intent))
                .description("merge duplicates into one coherent durable memory record")
                .purpose_alignment(0.9)
                .expected_impact(0.6)
                .risk(RiskLevel::Safe)
                .build();
        let id = engine.submit(proposal.clone()).await.unwrap();
        engine.quiesce().await.unwrap();
        engine.held_proposal(&id).unwrap().expect("proposal held")
    }

    fn register_four(controller: &GovernanceController, choices: [VoteChoice; 4]) {
        for (index, choice) in choices.into_iter().enumerate() {
            controller
                .register_member(Arc::new(StaticMember::new(
                    format!("member-{index}"),
                    1.0,
                    choice,
                    0.9,
                )))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn consensus_approval_resolves_and_dispatches() {
        let (engine, controller, store) = rig().await;
        let proposal = held_merge_proposal(&engine, &store).await;
        register_four(
            &controller,
            [
                VoteChoice::Approve,
                VoteChoice::Approve,
                VoteChoice::Approve,
                VoteChoice::Reject,
            ],
        );

        let session_id = controller.open_session(proposal, Urgency::Medium).unwrap();
        let status = controller.collect_votes(&session_id).unwrap();
        assert_eq!(status, SessionStatus::Completed);

        let archived = controller.archive().unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].decision, Some(FinalDecision::Approved));

        engine.quiesce().await.unwrap();
        let history = engine.executor().execution_history().unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn tie_at_deadline_defers() {
        let (engine, controller, store) = rig().await;
        let proposal = held_merge_proposal(&engine, &store).await;
        let proposal_id = proposal.id.clone();
        register_four(
            &controller,
            [
                VoteChoice::Approve,
                VoteChoice::Approve,
                VoteChoice::Reject,
                VoteChoice::Reject,
            ],
        );
        // A fifth member abstains by never voting, so the tie outlives the
        // vote collection and the deadline decides.
        controller
            .register_member(Arc::new(StaticMember::new(
                "member-4",
                1.0,
                VoteChoice::Abstain,
                0.5,
            )))
            .unwrap();

        let session_id = controller
            .open_session_with_deadline(
                proposal,
                Urgency::Medium,
                Utc::now() + chrono::Duration::seconds(30),
            )
            .unwrap();
        for member in ["member-0", "member-1"] {
            controller
                .cast_vote(&session_id, member, VoteChoice::Approve, 0.9)
                .unwrap();
        }
        for member in ["member-2", "member-3"] {
            controller
                .cast_vote(&session_id, member, VoteChoice::Reject, 0.9)
                .unwrap();
        }
        // 2 vs 2 with weight 1 each: no consensus; force the deadline.
        {
            let mut sessions = controller.sessions.lock().unwrap();
            let session = sessions.get_mut(&session_id).unwrap();
            session.deadline = Utc::now() - chrono::Duration::seconds(1);
        }
        let resolved = controller.expire_stale_sessions().unwrap();
        assert_eq!(resolved, vec![session_id]);

        let archived = controller.archive().unwrap();
        assert_eq!(archived[0].decision, Some(FinalDecision::Deferred));
        assert_eq!(engine.bus().count("proposal_deferred").unwrap(), 1);

        engine.quiesce().await.unwrap();
        assert!(engine.executor().execution_history().unwrap().is_empty());
        assert!(!engine.held_ids().unwrap().contains(&proposal_id));
    }

    #[tokio::test]
    async fn deadline_without_quorum_defers() {
        let (engine, controller, store) = rig().await;
        let proposal = held_merge_proposal(&engine, &store).await;
        register_four(
            &controller,
            [
                VoteChoice::Approve,
                VoteChoice::Approve,
                VoteChoice::Approve,
                VoteChoice::Approve,
            ],
        );

        let session_id = controller
            .open_session_with_deadline(
                proposal,
                Urgency::Low,
                Utc::now() + chrono::Duration::seconds(30),
            )
            .unwrap();
        controller
            .cast_vote(&session_id, "member-0", VoteChoice::Approve, 0.9)
            .unwrap();
        {
            let mut sessions = controller.sessions.lock().unwrap();
            sessions.get_mut(&session_id).unwrap().deadline =
                Utc::now() - chrono::Duration::seconds(1);
        }
        controller.expire_stale_sessions().unwrap();
        assert_eq!(
            controller.archive().unwrap()[0].decision,
            Some(FinalDecision::Deferred)
        );
        drop(engine);
    }

    #[tokio::test]
    async fn weighted_rejection_crosses_consensus() {
        let (engine, controller, store) = rig().await;
        let proposal = held_merge_proposal(&engine, &store).await;
        controller
            .register_member(Arc::new(StaticMember::new(
                "heavy",
                5.0,
                VoteChoice::Reject,
                1.0,
            )))
            .unwrap();
        register_four(
            &controller,
            [
                VoteChoice::Approve,
                VoteChoice::Approve,
                VoteChoice::Approve,
                VoteChoice::Approve,
            ],
        );

        let session_id = controller.open_session(proposal, Urgency::High).unwrap();
        controller
            .cast_vote(&session_id, "member-0", VoteChoice::Approve, 0.8)
            .unwrap();
        controller
            .cast_vote(&session_id, "member-1", VoteChoice::Approve, 0.8)
            .unwrap();
        // 5.0 against 2.0: rejection fraction 0.714 over quorum of 3.
        let status = controller
            .cast_vote(&session_id, "heavy", VoteChoice::Reject, 1.0)
            .unwrap();
        assert_eq!(status, SessionStatus::Completed);
        assert_eq!(
            controller.archive().unwrap()[0].decision,
            Some(FinalDecision::Rejected)
        );
        assert!(engine.bus().count("proposal_rejected").unwrap() >= 1);
    }

    #[tokio::test]
    async fn later_vote_supersedes_in_session() {
        let (engine, controller, store) = rig().await;
        let proposal = held_merge_proposal(&engine, &store).await;
        register_four(
            &controller,
            [
                VoteChoice::Approve,
                VoteChoice::Approve,
                VoteChoice::Approve,
                VoteChoice::Approve,
            ],
        );
        let session_id = controller.open_session(proposal, Urgency::Medium).unwrap();
        controller
            .cast_vote(&session_id, "member-0", VoteChoice::Reject, 0.5)
            .unwrap();
        controller
            .cast_vote(&session_id, "member-0", VoteChoice::Approve, 0.9)
            .unwrap();
        let session = controller.session(&session_id).unwrap().unwrap();
        assert_eq!(session.votes.len(), 1);
        assert_eq!(session.votes[0].choice, VoteChoice::Approve);
        drop(engine);
    }

    #[tokio::test]
    async fn unknown_member_cannot_vote() {
        let (engine, controller, store) = rig().await;
        let proposal = held_merge_proposal(&engine, &store).await;
        let session_id = controller.open_session(proposal, Urgency::Medium).unwrap();
        let err = controller
            .cast_vote(&session_id, "stranger", VoteChoice::Approve, 0.9)
            .unwrap_err();
        assert!(matches!(err, ForgeError::NotFound(_)));
        drop(engine);
    }

    #[tokio::test]
    async fn quorum_scales_with_membership() {
        let (engine, controller, store) = rig().await;
        let proposal = held_merge_proposal(&engine, &store).await;
        for index in 0..10 {
            controller
                .register_member(Arc::new(StaticMember::new(
                    format!("member-{index}"),
                    1.0,
                    VoteChoice::Approve,
                    0.9,
                )))
                .unwrap();
        }
        let session_id = controller.open_session(proposal, Urgency::Medium).unwrap();
        let session = controller.session(&session_id).unwrap().unwrap();
        // max(min_quorum = 3, ceil(10 / 2) = 5)
        assert_eq!(session.quorum, 5);
        drop(engine);
    }
}
