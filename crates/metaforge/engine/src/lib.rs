#![deny(unsafe_code)]
//! Meta-forging engine: the orchestration core of the self-modification
//! pipeline.
//!
//! The engine owns the FIFO proposal queue, validates submissions (including
//! the purpose lock), scores them with the evaluator, and either dispatches
//! approved proposals to the executor, holds them for governance, or rejects
//! them. Every transition is published as a [`metaforge_types::ForgeEvent`]
//! through the [`EventBus`].

pub mod bus;
pub mod engine;

pub use bus::{Chronicler, EventBus, EventBusStats};
pub use engine::{EngineBuilder, MetaForgingEngine};
