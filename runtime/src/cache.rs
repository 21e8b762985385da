//! Per-context executor cache.
//!
//! [`ExecutorCache`] maps a descriptor key to a built executor using papaya's
//! lock-free HashMap. Every key owns a [`OnceCell`] slot: the first caller
//! runs the builder, concurrent callers for the same key block on that slot
//! and observe the winner's executor. A failing builder unlinks its slot while
//! still holding it, so waiters and later calls retry on a fresh slot.
//!
//! [`MultiCache`] holds one [`ExecutorCache`] per (key, value) type pair and is
//! what an execution context owns.
//!
//! # Thread Safety
//!
//! All operations are thread-safe. There is no eviction; entries live until
//! [`ExecutorCache::clear`] or until the cache is dropped.

use std::any::{Any, TypeId};
use std::collections::HashMap as StdHashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use papaya::{Compute, HashMap, Operation};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::key::CacheKey;

/// Outcome of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookUpStatus {
    Hit,
    Miss,
}

type Slot<V> = Arc<OnceCell<V>>;

enum Attempt<E> {
    /// The slot was unlinked by a failed build; look the key up again.
    Stale,
    Failed(E),
}

pub struct ExecutorCache<K, V> {
    entries: HashMap<K, Slot<V>>,
}

impl<K: CacheKey, V: Clone + Send + Sync + 'static> ExecutorCache<K, V> {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Get the value for `key`, building it with `build` if absent.
    ///
    /// `build` runs at most once per key while it keeps succeeding, no matter
    /// how many threads ask concurrently. Its error is returned to the caller
    /// that ran it and nothing is cached.
    pub fn get_or_create<E>(&self, key: &K, build: impl FnOnce(&K) -> Result<V, E>) -> Result<(V, LookUpStatus), E> {
        let mut build = Some(build);

        loop {
            let slot = self.slot(key);
            let mut built = false;
            let result = slot.get_or_try_init(|| {
                // A failed builder unlinks its slot before releasing it
                if !self.is_current(key, &slot) {
                    return Err(Attempt::Stale);
                }
                let Some(build) = build.take() else {
                    unreachable!("builder is consumed only by a finished attempt");
                };
                built = true;
                build(key).map_err(|error| {
                    self.remove_empty(key, &slot);
                    Attempt::Failed(error)
                })
            });

            match result {
                Ok(value) if built => {
                    debug!(key = key.hash_value(), "executor cache miss, built");
                    self.reinsert(key, &slot);
                    return Ok((value.clone(), LookUpStatus::Miss));
                }
                Ok(value) => {
                    trace!(key = key.hash_value(), "executor cache hit");
                    return Ok((value.clone(), LookUpStatus::Hit));
                }
                Err(Attempt::Stale) => {
                    trace!(key = key.hash_value(), "stale cache slot, retrying lookup");
                }
                Err(Attempt::Failed(error)) => {
                    debug!(key = key.hash_value(), "executor build failed, dropped slot");
                    return Err(error);
                }
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.entries.guard();
        self.entries.get(key, &guard).and_then(|slot| slot.get().cloned())
    }

    /// Check if a built value is present for `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        let guard = self.entries.guard();
        self.entries.iter(&guard).filter(|(_, slot)| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let guard = self.entries.guard();
        self.entries.clear(&guard);
    }

    // Slot registered for `key`, inserted if absent
    fn slot(&self, key: &K) -> Slot<V> {
        let guard = self.entries.guard();
        if let Some(slot) = self.entries.get(key, &guard) {
            return Arc::clone(slot);
        }

        let fresh: Slot<V> = Arc::new(OnceCell::new());
        match self.entries.compute(
            key.clone(),
            |entry| match entry {
                Some((_, existing)) => Operation::Abort(Arc::clone(existing)),
                None => Operation::Insert(Arc::clone(&fresh)),
            },
            &guard,
        ) {
            Compute::Aborted(existing) => existing,
            _ => fresh,
        }
    }

    fn is_current(&self, key: &K, slot: &Slot<V>) -> bool {
        let guard = self.entries.guard();
        self.entries.get(key, &guard).is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    // Remove the slot only if it is still ours and nobody filled it meanwhile
    fn remove_empty(&self, key: &K, slot: &Slot<V>) {
        let guard = self.entries.guard();
        let _ = self.entries.compute(
            key.clone(),
            |entry| match entry {
                Some((_, current)) if Arc::ptr_eq(current, slot) && current.get().is_none() => Operation::Remove,
                _ => Operation::Abort(()),
            },
            &guard,
        );
    }

    // `clear` may have dropped the slot while it was building
    fn reinsert(&self, key: &K, slot: &Slot<V>) {
        let guard = self.entries.guard();
        let _ = self.entries.compute(
            key.clone(),
            |entry| match entry {
                None => Operation::Insert(Arc::clone(slot)),
                Some(_) => Operation::Abort(()),
            },
            &guard,
        );
    }
}

impl<K: CacheKey, V: Clone + Send + Sync + 'static> Default for ExecutorCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

trait ErasedCache: Send + Sync {
    fn len(&self) -> usize;
    fn clear(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<K: CacheKey, V: Clone + Send + Sync + 'static> ErasedCache for ExecutorCache<K, V> {
    fn len(&self) -> usize {
        ExecutorCache::len(self)
    }

    fn clear(&self) {
        ExecutorCache::clear(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// One [`ExecutorCache`] per (key, value) type pair.
///
/// Owned by an execution context; nodes of different operator types share it
/// without sharing entries.
#[derive(Default)]
pub struct MultiCache {
    caches: RwLock<StdHashMap<TypeId, Arc<dyn ErasedCache>>>,
}

impl MultiCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// [`ExecutorCache::get_or_create`] on the cache for `K`/`V`.
    pub fn get_or_create<K, V, E>(
        &self,
        key: &K,
        build: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<(V, LookUpStatus), E>
    where
        K: CacheKey,
        V: Clone + Send + Sync + 'static,
    {
        self.cache::<K, V>().get_or_create(key, build)
    }

    /// The cache for `K`/`V`, created on first use.
    pub fn cache<K, V>(&self) -> Arc<ExecutorCache<K, V>>
    where
        K: CacheKey,
        V: Clone + Send + Sync + 'static,
    {
        let id = TypeId::of::<ExecutorCache<K, V>>();

        // Fast path: read lock to check
        if let Some(cache) = self.caches.read().get(&id) {
            return downcast(Arc::clone(cache));
        }

        // Slow path: write lock, double-check before creating
        let mut caches = self.caches.write();
        let cache = caches.entry(id).or_insert_with(|| Arc::new(ExecutorCache::<K, V>::new()));
        downcast(Arc::clone(cache))
    }

    /// Total number of built entries across all typed caches.
    pub fn len(&self) -> usize {
        self.caches.read().values().map(|cache| cache.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        for cache in self.caches.read().values() {
            cache.clear();
        }
    }
}

impl std::fmt::Debug for MultiCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiCache").field("caches", &self.caches.read().len()).field("entries", &self.len()).finish()
    }
}

fn downcast<K, V>(cache: Arc<dyn ErasedCache>) -> Arc<ExecutorCache<K, V>>
where
    K: CacheKey,
    V: Clone + Send + Sync + 'static,
{
    match cache.into_any().downcast::<ExecutorCache<K, V>>() {
        Ok(cache) => cache,
        Err(_) => unreachable!("typed cache is registered under its own TypeId"),
    }
}
