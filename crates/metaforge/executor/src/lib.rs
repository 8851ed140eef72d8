#![deny(unsafe_code)]
//! Forge executor: applies approved proposals with a defined rollback
//! contract.
//!
//! An execution captures a checkpoint, dispatches to the change applier for
//! the proposal's target component, records `(path, before, after)` triples,
//! and on failure drives the proposal's rollback plan. The active set is
//! bounded; finished executions move to a bounded history.

pub mod appliers;
pub mod executor;

pub use appliers::{
    ApplierContext, ChangeApplier, Checkpoint, MemoryApplier, RecordingApplier,
};
pub use executor::{ExecutorConfig, ForgeExecutor};
