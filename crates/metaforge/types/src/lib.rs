#![deny(unsafe_code)]
//! Core data model for the metaforge self-modification pipeline.
//!
//! This crate defines:
//! - **Memory records** and their protection/link metadata ([`MemoryRecord`]).
//! - **Sculpt intents and results** — the six typed memory mutations
//!   ([`SculptOperation`], [`SculptorIntent`], [`SculptorResult`]).
//! - **Blueprint proposals** with typed specifications and rollback plans
//!   ([`BlueprintProposal`], [`SpecPayload`], [`RollbackPlan`]).
//! - **Evaluations, executions and voting sessions** ([`EvaluationResult`],
//!   [`ForgeExecution`], [`VotingSession`]).
//! - The **typed event stream** ([`ForgeEvent`]), the shared **configuration
//!   surface** ([`ForgeConfig`]) and the **error taxonomy** ([`ForgeError`]).

pub mod config;
pub mod error;
pub mod evaluation;
pub mod event;
pub mod execution;
pub mod intent;
pub mod proposal;
pub mod record;
pub mod result;
pub mod session;

// Re-exports for convenience.
pub use config::ForgeConfig;
pub use error::ForgeError;
pub use evaluation::{AxisScores, EvaluationResult, PurposeCore};
pub use event::{EventSink, ForgeEvent, NullSink};
pub use execution::{
    ChangeRecord, ExecutionId, ExecutionStatus, ForgeExecution, RollbackAttempt,
};
pub use intent::{OperationKind, SculptOperation, SculptorIntent};
pub use proposal::{
    BlueprintProposal, ChangeSpecification, ChangeType, PatchOp, ProposalBuilder, ProposalDraft,
    ProposalId, RiskLevel, RollbackPlan, RollbackStrategy, SpecPayload, TargetComponent,
};
pub use record::{meta, MemoryRecord, RecordContent, RecordId};
pub use result::{ImpactMetrics, RecordDelta, SculptFailure, SculptorResult};
pub use session::{
    FinalDecision, SessionId, SessionStatus, Urgency, Vote, VoteChoice, VoteTally, VotingSession,
};
