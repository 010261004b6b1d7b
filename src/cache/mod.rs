//! At-most-once compute caches for compiled templates and `cache` tag output.
//!
//! The engine depends only on the [`ComputeCache`] contract: for a given key the
//! compute closure runs at most once at a time, concurrent callers for the same key
//! wait for that computation and share its result, and nobody ever observes a
//! partially built value.
//!
//! # Concurrency
//!
//! [`ConcurrentCache`] keeps one slot per key in a `DashMap`. A slot holds a
//! `Mutex<Option<V>>`; the first caller holds the slot's lock while computing,
//! so later callers block on the lock instead of computing again. A compute that
//! asks for its own key on the same thread fails instead of waiting on itself. The map entry
//! itself is only touched briefly to fetch the slot, so computations for different
//! keys never wait on each other.
//!
//! A failed compute removes its slot and returns the error to the caller that ran
//! it. Callers that were waiting on the same slot notice the slot is gone and start
//! over with a fresh one, so each of them retries independently.
//!
//! [`NoOpCache`] computes on every call, for development setups where templates
//! change on disk.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, ThreadId};

use dashmap::DashMap;

use crate::core::{CobbleError, ErrorLocation};
use crate::value::Value;

/// Key of the compiled-template cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateCacheKey {
    /// A template obtained through the engine's loader, keyed by the loader's cache key
    Named(String),
    /// A template compiled from its own source text
    Literal(String),
}

/// Key of the `cache` tag output cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagCacheKey {
    /// Template the `cache` tag was compiled in
    pub template: String,
    /// Position of the tag among its template's `cache` tags
    pub tag: usize,
    /// The evaluated cache name
    pub name: Value,
    pub locale: String,
}

/// Counters describing how a cache has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub computes: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    computes: AtomicU64,
    failures: AtomicU64,
}

impl StatsCounter {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computes: self.computes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// A key-value store with an atomic compute-if-absent.
pub trait ComputeCache<K, V>: Send + Sync {
    /// Return the cached value for `key`, running `compute` to produce it if absent.
    ///
    /// # Errors
    ///
    /// Whatever `compute` returns. A failure leaves the key absent.
    fn compute_if_absent(
        &self,
        key: &K,
        compute: &mut dyn FnMut() -> Result<V, CobbleError>,
    ) -> Result<V, CobbleError>;

    /// The cached value, without computing or waiting.
    fn get(&self, key: &K) -> Option<V>;

    fn invalidate(&self, key: &K);

    fn invalidate_all(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> CacheStats;
}

struct SlotState<V> {
    value: Mutex<Option<V>>,
    /// Thread running the compute, while one runs
    owner: Mutex<Option<ThreadId>>,
}

impl<V> Default for SlotState<V> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
            owner: Mutex::new(None),
        }
    }
}

impl<V> SlotState<V> {
    fn computing_on_current_thread(&self) -> bool {
        *lock(&self.owner) == Some(thread::current().id())
    }

    /// Mark the current thread as computing until the guard drops.
    fn claim(&self) -> OwnerGuard<'_, V> {
        *lock(&self.owner) = Some(thread::current().id());
        OwnerGuard(self)
    }
}

struct OwnerGuard<'a, V>(&'a SlotState<V>);

impl<V> Drop for OwnerGuard<'_, V> {
    fn drop(&mut self) {
        *lock(&self.0.owner) = None;
    }
}

type Slot<V> = Arc<SlotState<V>>;

/// Thread-safe cache computing each key at most once at a time.
pub struct ConcurrentCache<K, V> {
    slots: DashMap<K, Slot<V>>,
    stats: StatsCounter,
    name: &'static str,
}

impl<K, V> ConcurrentCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync,
    V: Clone + Send + Sync,
{
    /// An empty cache; `name` labels its log lines.
    pub fn new(name: &'static str) -> Self {
        Self {
            slots: DashMap::new(),
            stats: StatsCounter::default(),
            name,
        }
    }

    fn slot(&self, key: &K) -> Slot<V> {
        self.slots.entry(key.clone()).or_default().clone()
    }

    fn is_current(&self, key: &K, slot: &Slot<V>) -> bool {
        self.slots.get(key).is_some_and(|current| Arc::ptr_eq(current.value(), slot))
    }
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    // a compute that panicked never stored a value, so the slot is still consistent
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<K, V> ComputeCache<K, V> for ConcurrentCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync,
    V: Clone + Send + Sync,
{
    fn compute_if_absent(
        &self,
        key: &K,
        compute: &mut dyn FnMut() -> Result<V, CobbleError>,
    ) -> Result<V, CobbleError> {
        loop {
            let slot = self.slot(key);
            if slot.computing_on_current_thread() {
                return Err(CobbleError::Render {
                    message: format!("Recursive computation of {} cache key {:?}", self.name, key),
                    location: Box::new(ErrorLocation::unknown()),
                    source: None,
                });
            }
            let mut guard = lock(&slot.value);
            if let Some(value) = guard.as_ref() {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value.clone());
            }
            if !self.is_current(key, &slot) {
                tracing::debug!(target: "cobble::cache", cache = self.name, ?key, "compute failed elsewhere, retrying");
                continue;
            }

            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            self.stats.computes.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target: "cobble::cache", cache = self.name, ?key, "computing");
            let claim = slot.claim();
            let result = compute();
            drop(claim);
            match result {
                Ok(value) => {
                    *guard = Some(value.clone());
                    return Ok(value);
                }
                Err(e) => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    self.slots.remove_if(key, |_, current| Arc::ptr_eq(current, &slot));
                    drop(guard);
                    tracing::debug!(target: "cobble::cache", cache = self.name, ?key, "compute failed, entry evicted");
                    return Err(e);
                }
            }
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        let slot = self.slots.get(key)?.value().clone();
        let value = match slot.value.try_lock() {
            Ok(guard) => guard.clone(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().clone(),
            Err(TryLockError::WouldBlock) => None,
        };
        value
    }

    fn invalidate(&self, key: &K) {
        self.slots.remove(key);
    }

    fn invalidate_all(&self) {
        self.slots.clear();
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}

impl<K: Eq + Hash, V> fmt::Debug for ConcurrentCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentCache")
            .field("name", &self.name)
            .field("entries", &self.slots.len())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

/// Cache that never stores anything.
#[derive(Debug, Default)]
pub struct NoOpCache {
    stats: StatsCounter,
}

impl NoOpCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, V> ComputeCache<K, V> for NoOpCache {
    fn compute_if_absent(
        &self,
        _key: &K,
        compute: &mut dyn FnMut() -> Result<V, CobbleError>,
    ) -> Result<V, CobbleError> {
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        self.stats.computes.fetch_add(1, Ordering::Relaxed);
        compute().inspect_err(|_| {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
        })
    }

    fn get(&self, _key: &K) -> Option<V> {
        None
    }

    fn invalidate(&self, _key: &K) {}

    fn invalidate_all(&self) {}

    fn len(&self) -> usize {
        0
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_second_lookup_hits() -> anyhow::Result<()> {
        let cache: ConcurrentCache<String, usize> = ConcurrentCache::new("test");
        let key = "k".to_string();
        assert_eq!(cache.compute_if_absent(&key, &mut || Ok(1))?, 1);
        assert_eq!(cache.compute_if_absent(&key, &mut || Ok(2))?, 1);
        assert_eq!(cache.get(&key), Some(1));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.computes), (1, 1));
        Ok(())
    }

    #[test]
    fn test_concurrent_callers_compute_once() -> anyhow::Result<()> {
        const THREADS: usize = 8;
        let cache: Arc<ConcurrentCache<&'static str, usize>> = Arc::new(ConcurrentCache::new("test"));
        let computes = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = cache.clone();
                let computes = computes.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.compute_if_absent(&"shared", &mut || {
                        computes.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        Ok(42)
                    })
                })
            })
            .collect();

        for handle in handles {
            let value = handle.join().map_err(|_| anyhow::anyhow!("worker panicked"))??;
            assert_eq!(value, 42);
        }
        assert_eq!(computes.load(Ordering::SeqCst), 1, "compute must run exactly once");
        Ok(())
    }

    #[test]
    fn test_failure_is_not_cached() -> anyhow::Result<()> {
        let cache: ConcurrentCache<u32, String> = ConcurrentCache::new("test");
        let err = cache.compute_if_absent(&1, &mut || Err(CobbleError::WriterClosed));
        assert!(err.is_err());
        assert!(cache.is_empty(), "failed compute must not leave an entry");
        assert_eq!(cache.compute_if_absent(&1, &mut || Ok("ok".to_string()))?, "ok");
        assert_eq!(cache.stats().failures, 1);
        Ok(())
    }

    #[test]
    fn test_waiters_retry_after_failure() -> anyhow::Result<()> {
        let cache: Arc<ConcurrentCache<u32, u32>> = Arc::new(ConcurrentCache::new("test"));
        let attempts = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(2));

        let first = {
            let cache = cache.clone();
            let attempts = attempts.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                cache.compute_if_absent(&7, &mut || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    barrier.wait();
                    thread::sleep(Duration::from_millis(30));
                    Err(CobbleError::WriterClosed)
                })
            })
        };
        barrier.wait();
        let second = cache.compute_if_absent(&7, &mut || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok(9)
        });

        let first = first.join().map_err(|_| anyhow::anyhow!("worker panicked"))?;
        assert!(first.is_err(), "the failure belongs to the caller that computed");
        assert_eq!(second?, 9, "the waiter recomputes on its own");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn test_recursive_compute_fails_instead_of_waiting() -> anyhow::Result<()> {
        let cache: Arc<ConcurrentCache<u32, u32>> = Arc::new(ConcurrentCache::new("test"));
        let (done, finished) = std::sync::mpsc::channel();
        let worker = cache.clone();
        thread::spawn(move || {
            let outer = worker.compute_if_absent(&1, &mut || worker.compute_if_absent(&1, &mut || Ok(2)));
            let _ = done.send(outer);
        });

        let outer = finished.recv_timeout(Duration::from_secs(5)).map_err(|_| anyhow::anyhow!("compute hung"))?;
        match outer {
            Err(CobbleError::Render { message, .. }) => assert!(message.starts_with("Recursive computation"), "{message}"),
            other => panic!("expected a render error, got {other:?}"),
        }
        assert!(cache.is_empty(), "the failed compute leaves no entry");
        assert_eq!(cache.compute_if_absent(&1, &mut || Ok(3))?, 3, "the owner mark is cleared");
        Ok(())
    }

    #[test]
    fn test_invalidate() -> anyhow::Result<()> {
        let cache: ConcurrentCache<u32, u32> = ConcurrentCache::new("test");
        cache.compute_if_absent(&1, &mut || Ok(1))?;
        cache.compute_if_absent(&2, &mut || Ok(2))?;
        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.len(), 1);
        cache.invalidate_all();
        assert!(cache.is_empty());
        Ok(())
    }

    #[test]
    fn test_noop_always_computes() -> anyhow::Result<()> {
        let cache = NoOpCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            ComputeCache::<u32, u32>::compute_if_absent(&cache, &1, &mut || {
                calls += 1;
                Ok(calls)
            })?;
        }
        assert_eq!(calls, 3);
        assert_eq!(ComputeCache::<u32, u32>::get(&cache, &1), None);
        Ok(())
    }
}
