use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use metaforge_types::{ForgeError, MemoryRecord, RecordId};

use crate::query::RecordQuery;
use crate::{MemoryStore, StoreEvent};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lock-guarded in-memory record store.
///
/// Every successful mutation and query broadcasts a [`StoreEvent`]; absent
/// or lagging subscribers never fail the store operation.
pub struct InMemoryStore {
    records: RwLock<HashMap<RecordId, MemoryRecord>>,
    events: broadcast::Sender<StoreEvent>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            records: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to memory activity notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Announce that a merge consolidated these records.
    ///
    /// The store itself cannot tell a merge's deletes from ordinary ones, so
    /// the component completing the merge publishes this.
    pub fn publish_consolidated(&self, agent_id: impl Into<String>, merged: Vec<RecordId>) {
        let _ = self.events.send(StoreEvent::Consolidated {
            agent_id: agent_id.into(),
            merged,
            at: Utc::now(),
        });
    }

    pub fn len(&self) -> Result<usize, ForgeError> {
        let map = self.records.read().map_err(|_| ForgeError::LockError)?;
        Ok(map.len())
    }

    pub fn is_empty(&self) -> Result<bool, ForgeError> {
        Ok(self.len()? == 0)
    }

    /// Seed the store with records, bypassing event emission.
    pub fn seed(
        &self,
        records: impl IntoIterator<Item = MemoryRecord>,
    ) -> Result<(), ForgeError> {
        let mut map = self.records.write().map_err(|_| ForgeError::LockError)?;
        for record in records {
            map.insert(record.id.clone(), record);
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn get(&self, id: &RecordId) -> Result<Option<MemoryRecord>, ForgeError> {
        let map = self.records.read().map_err(|_| ForgeError::LockError)?;
        Ok(map.get(id).cloned())
    }

    async fn query(
        &self,
        agent_id: &str,
        query: &RecordQuery,
    ) -> Result<Vec<MemoryRecord>, ForgeError> {
        let now = Utc::now();
        let mut matched: Vec<MemoryRecord> = {
            let map = self.records.read().map_err(|_| ForgeError::LockError)?;
            map.values()
                .filter(|r| r.agent_id == agent_id && query.matches(r, now))
                .cloned()
                .collect()
        };
        matched.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));

        debug!(agent_id, returned = matched.len(), "memory query");
        let _ = self.events.send(StoreEvent::Queried {
            agent_id: agent_id.to_string(),
            returned: matched.iter().map(|r| r.id.clone()).collect(),
            at: now,
        });
        Ok(matched)
    }

    async fn put(&self, record: MemoryRecord) -> Result<(), ForgeError> {
        {
            let mut map = self.records.write().map_err(|_| ForgeError::LockError)?;
            map.insert(record.id.clone(), record.clone());
        }
        let _ = self.events.send(StoreEvent::Stored {
            record,
            at: Utc::now(),
        });
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<(), ForgeError> {
        {
            let mut map = self.records.write().map_err(|_| ForgeError::LockError)?;
            if map.remove(id).is_none() {
                return Err(ForgeError::NotFound(id.to_string()));
            }
        }
        let _ = self.events.send(StoreEvent::Deleted {
            id: id.clone(),
            at: Utc::now(),
        });
        Ok(())
    }
}
