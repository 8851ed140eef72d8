use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::warn;

use metaforge_types::{ForgeError, OperationKind, SculptorIntent, SculptorResult};

/// What a pre-hook decided about an intent.
#[derive(Clone, Debug, PartialEq)]
pub enum PreHookOutcome {
    Proceed,
    Veto { reason: String },
}

/// Registry-level decision after running all admitted pre-hooks.
#[derive(Clone, Debug, PartialEq)]
pub enum HookDecision {
    Proceed,
    Veto { hook_id: String, reason: String },
}

/// Pre/post callback pair invoked around sculpt operations.
///
/// Pre-hooks may veto; post-hooks observe. Post-hook errors never change the
/// outcome of the operation that invoked them.
#[async_trait]
pub trait SculptHook: Send + Sync {
    async fn pre(&self, _intent: &SculptorIntent) -> PreHookOutcome {
        PreHookOutcome::Proceed
    }

    async fn post(&self, _result: &SculptorResult) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Scope filter ANDing on operation kinds and agent ids.
///
/// An empty set is a wildcard.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HookFilter {
    pub operations: BTreeSet<OperationKind>,
    pub agent_ids: BTreeSet<String>,
}

impl HookFilter {
    pub fn wildcard() -> Self {
        Self::default()
    }

    pub fn for_operation(mut self, operation: OperationKind) -> Self {
        self.operations.insert(operation);
        self
    }

    pub fn for_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_ids.insert(agent_id.into());
        self
    }

    pub fn admits(&self, intent: &SculptorIntent) -> bool {
        let op_ok =
            self.operations.is_empty() || self.operations.contains(&intent.operation.kind());
        let agent_ok = self.agent_ids.is_empty() || self.agent_ids.contains(&intent.agent_id);
        op_ok && agent_ok
    }
}

/// Identity, scope and ordering of one registered hook.
#[derive(Clone, Debug, PartialEq)]
pub struct HookRegistration {
    pub id: String,
    pub filter: HookFilter,
    /// Higher priority runs first; ties run in registration order.
    pub priority: i32,
}

impl HookRegistration {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filter: HookFilter::wildcard(),
            priority: 0,
        }
    }

    pub fn with_filter(mut self, filter: HookFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

struct HookEntry {
    registration: HookRegistration,
    hook: Arc<dyn SculptHook>,
    seq: u64,
}

/// Ordered pre/post hook registry.
///
/// Invocation is sequential relative to a single sculpt call.
pub struct HookRegistry {
    entries: RwLock<Vec<HookEntry>>,
    next_seq: AtomicU64,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a hook. A duplicate id replaces the existing entry and takes
    /// a fresh registration-order position.
    pub fn register(
        &self,
        registration: HookRegistration,
        hook: Arc<dyn SculptHook>,
    ) -> Result<(), ForgeError> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.write().map_err(|_| ForgeError::LockError)?;
        entries.retain(|e| e.registration.id != registration.id);
        entries.push(HookEntry {
            registration,
            hook,
            seq,
        });
        Ok(())
    }

    pub fn unregister(&self, id: &str) -> Result<bool, ForgeError> {
        let mut entries = self.entries.write().map_err(|_| ForgeError::LockError)?;
        let before = entries.len();
        entries.retain(|e| e.registration.id != id);
        Ok(entries.len() < before)
    }

    pub fn len(&self) -> Result<usize, ForgeError> {
        let entries = self.entries.read().map_err(|_| ForgeError::LockError)?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, ForgeError> {
        Ok(self.len()? == 0)
    }

    /// Hooks admitting this intent, in invocation order.
    fn admitted(
        &self,
        intent: &SculptorIntent,
    ) -> Result<Vec<(String, Arc<dyn SculptHook>)>, ForgeError> {
        let entries = self.entries.read().map_err(|_| ForgeError::LockError)?;
        let mut selected: Vec<&HookEntry> = entries
            .iter()
            .filter(|e| e.registration.filter.admits(intent))
            .collect();
        selected.sort_by(|a, b| {
            b.registration
                .priority
                .cmp(&a.registration.priority)
                .then(a.seq.cmp(&b.seq))
        });
        Ok(selected
            .into_iter()
            .map(|e| (e.registration.id.clone(), Arc::clone(&e.hook)))
            .collect())
    }

    /// Run all admitted pre-hooks in order; the first veto wins.
    pub async fn invoke_pre(&self, intent: &SculptorIntent) -> Result<HookDecision, ForgeError> {
        for (hook_id, hook) in self.admitted(intent)? {
            if let PreHookOutcome::Veto { reason } = hook.pre(intent).await {
                return Ok(HookDecision::Veto { hook_id, reason });
            }
        }
        Ok(HookDecision::Proceed)
    }

    /// Run all admitted post-hooks; hook errors are logged and swallowed.
    pub async fn invoke_post(&self, result: &SculptorResult) -> Result<(), ForgeError> {
        for (hook_id, hook) in self.admitted(&result.intent)? {
            if let Err(error) = hook.post(result).await {
                warn!(hook_id = %hook_id, error = %error, "post-hook failed");
            }
        }
        Ok(())
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
