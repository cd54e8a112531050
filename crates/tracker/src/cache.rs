//! Hot state cache
//!
//! Bounded map from object UID to the latest materialized object and its
//! revision. Entirely an optimization: with the cache disabled each commit
//! pays a restore from the store for the previous state.
//!
//! A single janitor thread evicts cold entries. An entry's TTL grows with
//! its hit count (`ttl_base + hits * ttl_hit_bonus`) and survivors have
//! their hit count halved each sweep, so stale popularity fades.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use tracing::trace;

use retrace_core::{Object, RevisionId};

use crate::clock::monotonic_nanos;
use crate::config::CacheConfig;

/// Latest materialized state of one tracked object.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedState {
    /// The materialized object. Owned by the cache; never aliases a
    /// caller's buffer.
    pub object: Object,
    /// Revision the object was materialized at.
    pub revision: RevisionId,
}

/// One cache slot. Recency and popularity counters are atomics so cache
/// hits stay off the map's write lock.
pub struct CacheEntry {
    state: Mutex<CachedState>,
    last_read: AtomicU64,
    hits: AtomicU32,
}

impl CacheEntry {
    fn new(state: CachedState) -> Self {
        CacheEntry {
            state: Mutex::new(state),
            last_read: AtomicU64::new(monotonic_nanos()),
            hits: AtomicU32::new(0),
        }
    }

    /// Lock this entry's state. Commit holds the per-uid tracker lock
    /// while mutating, so contention here is incidental.
    pub fn state(&self) -> MutexGuard<'_, CachedState> {
        self.state.lock()
    }
}

struct Shutdown {
    stopped: Mutex<bool>,
    wake: Condvar,
}

struct CacheInner {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    config: CacheConfig,
    shutdown: Shutdown,
}

/// Bounded, concurrent cache from object UID to latest state.
pub struct StateCache {
    inner: Arc<CacheInner>,
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl StateCache {
    /// Create a cache and start its janitor.
    pub fn new(config: CacheConfig) -> Self {
        let inner = Arc::new(CacheInner {
            entries: RwLock::new(HashMap::new()),
            config,
            shutdown: Shutdown {
                stopped: Mutex::new(false),
                wake: Condvar::new(),
            },
        });

        let janitor_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("retrace-cache-janitor".to_string())
            .spawn(move || janitor_loop(&janitor_inner))
            .expect("failed to spawn cache janitor");

        StateCache {
            inner,
            janitor: Mutex::new(Some(handle)),
        }
    }

    /// Look up an entry. A hit bumps the entry's hit count and recency.
    pub fn get(&self, uid: &str) -> Option<Arc<CacheEntry>> {
        let entry = Arc::clone(self.inner.entries.read().get(uid)?);
        entry.hits.fetch_add(1, Ordering::Relaxed);
        entry.last_read.store(monotonic_nanos(), Ordering::Relaxed);
        Some(entry)
    }

    /// Insert or overwrite the entry for `uid`. Silently dropped once the
    /// entry count has reached the hard maximum.
    pub fn set(&self, uid: &str, state: CachedState) {
        let mut entries = self.inner.entries.write();
        if entries.len() < self.inner.config.max_entries || entries.contains_key(uid) {
            entries.insert(uid.to_string(), Arc::new(CacheEntry::new(state)));
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the janitor and clear all entries.
    pub fn close(&self) {
        {
            let mut stopped = self.inner.shutdown.stopped.lock();
            *stopped = true;
            self.inner.shutdown.wake.notify_all();
        }
        if let Some(handle) = self.janitor.lock().take() {
            let _ = handle.join();
        }
        self.inner.entries.write().clear();
    }
}

fn janitor_loop(inner: &CacheInner) {
    loop {
        {
            let mut stopped = inner.shutdown.stopped.lock();
            if *stopped {
                return;
            }
            inner
                .shutdown
                .wake
                .wait_for(&mut stopped, inner.config.sweep_interval);
            if *stopped {
                return;
            }
        }
        evict_cold(inner);
    }
}

fn evict_cold(inner: &CacheInner) {
    let now = monotonic_nanos();
    let ttl_base = inner.config.ttl_base.as_nanos() as u64;
    let ttl_hit_bonus = inner.config.ttl_hit_bonus.as_nanos() as u64;

    let mut entries = inner.entries.write();
    let before = entries.len();
    entries.retain(|_, entry| {
        let age = now.saturating_sub(entry.last_read.load(Ordering::Relaxed));
        let hits = entry.hits.load(Ordering::Relaxed);
        let ttl = ttl_base.saturating_add(u64::from(hits).saturating_mul(ttl_hit_bonus));
        if age > ttl {
            return false;
        }
        // decay the hit counter so old popularity fades
        if hits > 0 {
            entry.hits.store(hits / 2, Ordering::Relaxed);
        }
        true
    });
    let evicted = before - entries.len();
    if evicted > 0 {
        trace!(evicted, remaining = entries.len(), "cache sweep");
    }
}

impl Drop for StateCache {
    fn drop(&mut self) {
        self.close();
    }
}
