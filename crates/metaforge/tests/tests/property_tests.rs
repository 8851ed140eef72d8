#[path = "property/evaluator_determinism.rs"]
mod evaluator_determinism;

#[path = "property/sculpt_idempotence.rs"]
mod sculpt_idempotence;
