//! Event bus: broadcast fan-out plus a bounded in-memory log, per-name
//! counters and synchronous named handlers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::broadcast;
use tracing::warn;

use metaforge_types::{EventSink, ForgeError, ForgeEvent};

const BROADCAST_CAPACITY: usize = 1024;
const DEFAULT_LOG_CAPACITY: usize = 512;

/// Optional fire-and-forget chronicler of pipeline events.
///
/// Failures are logged and never propagate to the operation that published
/// the event.
pub trait Chronicler: Send + Sync {
    fn record_event(&self, kind: &str, payload: serde_json::Value) -> anyhow::Result<()>;
}

type NamedHandler = (String, Box<dyn Fn(&ForgeEvent) + Send + Sync>);

/// Publishes typed events to broadcast subscribers, named handlers, the
/// bounded event log and the chronicler.
pub struct EventBus {
    sender: broadcast::Sender<ForgeEvent>,
    log: Mutex<VecDeque<ForgeEvent>>,
    counts: Mutex<BTreeMap<&'static str, u64>>,
    handlers: RwLock<Vec<NamedHandler>>,
    chronicler: RwLock<Option<Arc<dyn Chronicler>>>,
    log_capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_log_capacity(log_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sender,
            log: Mutex::new(VecDeque::new()),
            counts: Mutex::new(BTreeMap::new()),
            handlers: RwLock::new(Vec::new()),
            chronicler: RwLock::new(None),
            log_capacity,
        }
    }

    /// Attach a chronicler; every subsequent event is forwarded to it.
    pub fn set_chronicler(&self, chronicler: Arc<dyn Chronicler>) -> Result<(), ForgeError> {
        let mut slot = self.chronicler.write().map_err(|_| ForgeError::LockError)?;
        *slot = Some(chronicler);
        Ok(())
    }

    /// Subscribe to the live event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ForgeEvent> {
        self.sender.subscribe()
    }

    /// Register a synchronous handler for one event name.
    pub fn on(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&ForgeEvent) + Send + Sync + 'static,
    ) -> Result<(), ForgeError> {
        let mut handlers = self.handlers.write().map_err(|_| ForgeError::LockError)?;
        handlers.push((name.into(), Box::new(handler)));
        Ok(())
    }

    /// Publish an event to every outlet.
    pub fn publish(&self, event: ForgeEvent) -> Result<(), ForgeError> {
        let name = event.name();
        {
            let mut counts = self.counts.lock().map_err(|_| ForgeError::LockError)?;
            *counts.entry(name).or_insert(0) += 1;
        }
        {
            let mut log = self.log.lock().map_err(|_| ForgeError::LockError)?;
            log.push_back(event.clone());
            while log.len() > self.log_capacity {
                log.pop_front();
            }
        }
        {
            let handlers = self.handlers.read().map_err(|_| ForgeError::LockError)?;
            for (registered, handler) in handlers.iter() {
                if registered == name {
                    handler(&event);
                }
            }
        }
        {
            let chronicler = self.chronicler.read().map_err(|_| ForgeError::LockError)?;
            if let Some(chronicler) = chronicler.as_ref() {
                let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
                if let Err(error) = chronicler.record_event(name, payload) {
                    warn!(event = name, error = %error, "chronicler failed");
                }
            }
        }
        // Absent subscribers are not an error.
        let _ = self.sender.send(event);
        Ok(())
    }

    /// Events currently retained in the bounded log, oldest first.
    pub fn recent(&self) -> Result<Vec<ForgeEvent>, ForgeError> {
        let log = self.log.lock().map_err(|_| ForgeError::LockError)?;
        Ok(log.iter().cloned().collect())
    }

    /// How many events with this name have been published.
    pub fn count(&self, name: &str) -> Result<u64, ForgeError> {
        let counts = self.counts.lock().map_err(|_| ForgeError::LockError)?;
        Ok(counts.get(name).copied().unwrap_or(0))
    }

    pub fn stats(&self) -> Result<EventBusStats, ForgeError> {
        let counts = self.counts.lock().map_err(|_| ForgeError::LockError)?;
        Ok(EventBusStats {
            total_events: counts.values().sum(),
            events_by_name: counts
                .iter()
                .map(|(name, count)| (name.to_string(), *count))
                .collect(),
            subscriber_count: self.sender.receiver_count(),
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: ForgeEvent) -> Result<(), ForgeError> {
        EventBus::publish(self, event)
    }
}

/// Counters describing bus activity.
#[derive(Clone, Debug)]
pub struct EventBusStats {
    pub total_events: u64,
    pub events_by_name: BTreeMap<String, u64>,
    pub subscriber_count: usize,
}
