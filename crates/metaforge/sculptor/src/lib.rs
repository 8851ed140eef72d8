#![deny(unsafe_code)]
//! Memory sculptor: applies one typed mutation to a set of records as a
//! single logical transaction.
//!
//! A sculpt call validates its intent, runs pre-hooks (which may veto),
//! plans the mutation from captured before-states, applies it to the store,
//! and rolls back every already-applied step if any step fails. Post-hooks
//! observe the final result; their errors are logged and swallowed.

pub mod hooks;
pub mod ops;
pub mod sculptor;

pub use hooks::{
    HookDecision, HookFilter, HookRegistration, HookRegistry, PreHookOutcome, SculptHook,
};
pub use ops::{MutationPlan, MERGE_BOUNDARY};
pub use sculptor::{MemorySculptor, SculptorConfig};
