#![deny(unsafe_code)]
//! Memory store contract for the metaforge pipeline.
//!
//! The core consumes a narrow interface: typed CRUD plus predicate query
//! ([`MemoryStore`]). [`InMemoryStore`] is the reference implementation; it
//! additionally broadcasts [`StoreEvent`]s so the reflexive bridge can watch
//! memory activity without widening the contract.

pub mod in_memory;
pub mod query;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use async_trait::async_trait;
use metaforge_types::{ForgeError, MemoryRecord, RecordId};

pub use in_memory::InMemoryStore;
pub use query::RecordQuery;

/// Typed CRUD plus predicate query over memory records.
///
/// `put` is insert-or-full-replace by id; `delete` fails with `NotFound` for
/// absent ids; `query` is total. The sculptor relies on `put` honouring a
/// full replacement so captured before-states can be restored.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn get(&self, id: &RecordId) -> Result<Option<MemoryRecord>, ForgeError>;

    /// Records owned by `agent_id` matching the predicate, ordered by
    /// (timestamp, id).
    async fn query(
        &self,
        agent_id: &str,
        query: &RecordQuery,
    ) -> Result<Vec<MemoryRecord>, ForgeError>;

    async fn put(&self, record: MemoryRecord) -> Result<(), ForgeError>;

    async fn delete(&self, id: &RecordId) -> Result<(), ForgeError>;
}

/// Memory activity notifications consumed by the reflexive bridge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StoreEvent {
    Stored {
        record: MemoryRecord,
        at: DateTime<Utc>,
    },
    Deleted {
        id: RecordId,
        at: DateTime<Utc>,
    },
    Queried {
        agent_id: String,
        returned: Vec<RecordId>,
        at: DateTime<Utc>,
    },
    /// A merge completed over these source records.
    Consolidated {
        agent_id: String,
        merged: Vec<RecordId>,
        at: DateTime<Utc>,
    },
}
