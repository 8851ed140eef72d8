#[path = "e2e/auto_approved_relabel.rs"]
mod auto_approved_relabel;

#[path = "e2e/purpose_lock.rs"]
mod purpose_lock;

#[path = "e2e/protected_prune.rs"]
mod protected_prune;

#[path = "e2e/governance_tie.rs"]
mod governance_tie;

#[path = "e2e/hook_veto.rs"]
mod hook_veto;

#[path = "e2e/executor_rollback.rs"]
mod executor_rollback;

#[path = "e2e/bounded_concurrency.rs"]
mod bounded_concurrency;
