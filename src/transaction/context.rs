use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use tokio::task;

static NEXT_CHAIN_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CALL_CHAIN: Arc<CallChain>;
}

/// State bound to one logical call chain.
///
/// Each transaction manager keeps its own typed slot here, keyed by the manager's id, so two
/// database handles used from the same chain never see each other's lease.
pub struct CallChain {
    id: u64,
    slots: Mutex<HashMap<u64, Arc<dyn Any + Send + Sync>>>,
}

impl CallChain {
    fn new() -> Self {
        Self {
            id: NEXT_CHAIN_ID.fetch_add(1, Ordering::Relaxed),
            slots: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The slot stored under `key`, created with `init` on first use.
    pub fn slot<T, F>(&self, key: u64, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots
            .get(&key)
            .and_then(|existing| Arc::clone(existing).downcast::<T>().ok())
        {
            return slot;
        }
        let slot = Arc::new(init());
        slots.insert(key, slot.clone());
        slot
    }

    /// The slot stored under `key`, if one was ever created.
    #[must_use]
    pub fn existing_slot<T>(&self, key: u64) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&key)
            .and_then(|slot| Arc::clone(slot).downcast::<T>().ok())
    }
}

impl std::fmt::Debug for CallChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallChain").field("id", &self.id).finish_non_exhaustive()
    }
}

/// The call chain the current task is running in, if any.
#[must_use]
pub fn current() -> Option<Arc<CallChain>> {
    CALL_CHAIN.try_with(Arc::clone).ok()
}

/// Run `fut` as one call chain. Inside an existing chain the future simply joins it.
pub async fn scope<F>(fut: F) -> F::Output
where
    F: Future,
{
    if current().is_some() {
        fut.await
    } else {
        CALL_CHAIN.scope(Arc::new(CallChain::new()), fut).await
    }
}

/// Task identity for callers outside any scope. Futures driven by `block_on` are not tasks
/// and fall back to the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AmbientKey {
    Task(task::Id),
    Thread(ThreadId),
}

impl AmbientKey {
    fn current() -> Self {
        task::try_id().map_or_else(|| Self::Thread(thread::current().id()), Self::Task)
    }
}

/// Chains for statements issued outside any [`scope`], one per task.
///
/// An entry lives from the first `BEGIN` until the matching terminal statement, or until the
/// owner clears it on close.
#[derive(Debug, Default)]
pub struct AmbientChains {
    chains: Mutex<HashMap<AmbientKey, Arc<CallChain>>>,
}

impl AmbientChains {
    /// The current task's chain, created on first use.
    pub fn current_or_insert(&self) -> Arc<CallChain> {
        let mut chains = self.chains.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            chains
                .entry(AmbientKey::current())
                .or_insert_with(|| Arc::new(CallChain::new())),
        )
    }

    /// The current task's chain, if it has one.
    #[must_use]
    pub fn current(&self) -> Option<Arc<CallChain>> {
        let chains = self.chains.lock().unwrap_or_else(PoisonError::into_inner);
        chains.get(&AmbientKey::current()).cloned()
    }

    /// Forget the current task's chain if it is `chain`.
    pub fn release(&self, chain: &CallChain) {
        let mut chains = self.chains.lock().unwrap_or_else(PoisonError::into_inner);
        let key = AmbientKey::current();
        if chains.get(&key).is_some_and(|held| held.id() == chain.id()) {
            chains.remove(&key);
        }
    }

    pub fn clear(&self) {
        self.chains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
