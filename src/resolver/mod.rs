// Identifier → display-name resolution with single-flight backfill

use crate::mqtt::slug;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinSet;
use tracing::debug;


/// Placeholder key used by resolvers that must not leak raw ids into topics.
pub const UNKNOWN_SENTINEL: &str = "-unknown-";

/// A lookup that may run in the background to fill a cache miss.
pub type NameFetch = BoxFuture<'static, Option<String>>;

/// What `resolve` hands back on a miss.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MissPolicy {
    /// Use the identifier itself as the key
    RawId,
    /// Use a fixed placeholder as the key
    Sentinel(String),
}

impl MissPolicy {
    pub fn unknown() -> Self {
        MissPolicy::Sentinel(UNKNOWN_SENTINEL.to_string())
    }
}

/// Result of a lookup: a path-safe key plus the display name when known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub key: String,
    pub name: Option<String>,
}

impl Resolution {
    fn resolved(name: &str) -> Self {
        Self {
            key: slug(name),
            name: Some(name.to_string()),
        }
    }

    /// The display name, or the fallback key when unresolved.
    pub fn display(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.key)
    }
}

/// Per-id state. An id with no slot is absent.
#[derive(Clone, Debug)]
enum Slot {
    /// A fetch started during `generation` is in flight
    Pending { generation: u64 },
    Present(String),
}

struct Inner {
    slots: HashMap<String, Slot>,
    /// Bumped by `replace_all`; stale fetch completions are discarded
    generation: u64,
}

/// Single-flight id → name cache.
///
/// `resolve` never waits on I/O: it answers from the cache or the miss policy
/// and, at most once per id, spawns the supplied fetch to fill the gap.
/// Spawned fetches are tracked and aborted by [`ResolverCache::shutdown`].
#[derive(Clone)]
pub struct ResolverCache {
    label: &'static str,
    policy: MissPolicy,
    inner: Arc<Mutex<Inner>>,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl ResolverCache {
    pub fn new(label: &'static str, policy: MissPolicy) -> Self {
        Self {
            label,
            policy,
            inner: Arc::new(Mutex::new(Inner {
                slots: HashMap::new(),
                generation: 0,
            })),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve `id` to a key and (when known) a display name.
    ///
    /// 1. A non-empty `preferred` name is cached and returned.
    /// 2. A cached name is returned.
    /// 3. Otherwise, if `fetch` is given and nothing is in flight for `id`, the
    ///    fetch is spawned. The miss policy answers immediately.
    ///
    /// Must be called from within a Tokio runtime when `fetch` may be spawned.
    pub fn resolve(&self, id: &str, preferred: Option<&str>, fetch: Option<NameFetch>) -> Resolution {
        let mut inner = self.lock();

        if let Some(name) = preferred.filter(|n| !n.trim().is_empty()) {
            inner
                .slots
                .insert(id.to_string(), Slot::Present(name.to_string()));
            return Resolution::resolved(name);
        }

        match inner.slots.get(id) {
            Some(Slot::Present(name)) => return Resolution::resolved(name),
            Some(Slot::Pending { .. }) => return self.fallback(id),
            None => {}
        }

        if let Some(fetch) = fetch {
            let generation = inner.generation;
            inner
                .slots
                .insert(id.to_string(), Slot::Pending { generation });
            drop(inner);

            debug!(cache = self.label, id = %id, "Backfilling name");
            let cache = self.clone();
            let id = id.to_string();
            let mut tasks = self.lock_tasks();
            while tasks.try_join_next().is_some() {}
            tasks.spawn(async move {
                let name = fetch.await;
                cache.complete_fetch(&id, generation, name);
            });
        }

        self.fallback(id)
    }

    fn fallback(&self, id: &str) -> Resolution {
        let key = match &self.policy {
            MissPolicy::RawId => id.to_string(),
            MissPolicy::Sentinel(sentinel) => sentinel.clone(),
        };
        Resolution { key, name: None }
    }

    fn complete_fetch(&self, id: &str, generation: u64, name: Option<String>) {
        let mut inner = self.lock();

        if inner.generation != generation {
            debug!(cache = self.label, id = %id, "Discarding fetch from before cache reload");
            return;
        }

        // Only the pending marker this fetch placed may be replaced; a name
        // supplied directly while the fetch ran wins.
        if !matches!(inner.slots.get(id), Some(Slot::Pending { generation: g }) if *g == generation) {
            return;
        }

        match name.filter(|n| !n.trim().is_empty()) {
            Some(name) => {
                debug!(cache = self.label, id = %id, name = %name, "Name resolved");
                inner.slots.insert(id.to_string(), Slot::Present(name));
            }
            None => {
                debug!(cache = self.label, id = %id, "Name lookup returned nothing");
                inner.slots.remove(id);
            }
        }
    }

    /// Swap in a complete table, dropping every pending marker.
    ///
    /// Fetches still in flight complete into the void.
    pub fn replace_all(&self, names: HashMap<String, String>) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.slots = names
            .into_iter()
            .filter(|(_, name)| !name.trim().is_empty())
            .map(|(id, name)| (id, Slot::Present(name)))
            .collect();
        debug!(
            cache = self.label,
            entries = inner.slots.len(),
            generation = inner.generation,
            "Cache replaced"
        );
    }

    /// Cached name for `id`, if present.
    pub fn get(&self, id: &str) -> Option<String> {
        match self.lock().slots.get(id) {
            Some(Slot::Present(name)) => Some(name.clone()),
            _ => None,
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        matches!(self.lock().slots.get(id), Some(Slot::Pending { .. }))
    }

    /// Number of resolved names
    pub fn len(&self) -> usize {
        self.lock()
            .slots
            .values()
            .filter(|s| matches!(s, Slot::Present(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every fetch spawned so far to finish.
    pub async fn join_pending_fetches(&self) {
        let mut tasks = std::mem::take(&mut *self.lock_tasks());
        while tasks.join_next().await.is_some() {}
    }

    /// Abort outstanding fetches and forget their pending markers.
    pub fn shutdown(&self) {
        let aborted = {
            let mut tasks = self.lock_tasks();
            let count = tasks.len();
            tasks.abort_all();
            count
        };

        let mut inner = self.lock();
        inner.generation += 1;
        inner.slots.retain(|_, slot| matches!(slot, Slot::Present(_)));

        if aborted > 0 {
            debug!(cache = self.label, aborted = aborted, "Aborted outstanding name fetches");
        }
    }
}
