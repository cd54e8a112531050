//! Per-object lock map
//!
//! Commit holds one of these mutexes for its whole read-previous → diff →
//! write window, so commits to one object are strictly serialized while
//! different objects proceed in parallel.
//!
//! Entries are created on demand and a janitor drops unheld locks that
//! have been idle past their TTL, bounding memory under churny workloads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::clock::monotonic_nanos;

const SWEEP_INTERVAL: Duration = Duration::from_secs(10);
const IDLE_TTL: Duration = Duration::from_secs(60);

/// One per-uid lock slot.
pub(crate) struct UidLock {
    pub(crate) mu: Mutex<()>,
    last_use: AtomicU64,
}

struct MapInner {
    entries: Mutex<HashMap<String, Arc<UidLock>>>,
    sweep_interval: Duration,
    idle_ttl: Duration,
    stopped: Mutex<bool>,
    wake: Condvar,
}

pub(crate) struct LockMap {
    inner: Arc<MapInner>,
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl LockMap {
    pub(crate) fn new() -> Self {
        Self::with_ttl(SWEEP_INTERVAL, IDLE_TTL)
    }

    pub(crate) fn with_ttl(sweep_interval: Duration, idle_ttl: Duration) -> Self {
        let inner = Arc::new(MapInner {
            entries: Mutex::new(HashMap::new()),
            sweep_interval,
            idle_ttl,
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });

        let janitor_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("retrace-lock-janitor".to_string())
            .spawn(move || janitor_loop(&janitor_inner))
            .expect("failed to spawn lock janitor");

        LockMap {
            inner,
            janitor: Mutex::new(Some(handle)),
        }
    }

    /// Fetch (or create) the lock slot for `uid`. The caller locks the
    /// returned entry's mutex locally; holding the `Arc` keeps the slot
    /// safe from the janitor while in use.
    pub(crate) fn entry(&self, uid: &str) -> Arc<UidLock> {
        let mut entries = self.inner.entries.lock();
        let entry = entries
            .entry(uid.to_string())
            .or_insert_with(|| {
                Arc::new(UidLock {
                    mu: Mutex::new(()),
                    last_use: AtomicU64::new(0),
                })
            });
        entry.last_use.store(monotonic_nanos(), Ordering::Relaxed);
        Arc::clone(entry)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Stop the janitor and drop all lock entries.
    pub(crate) fn close(&self) {
        {
            let mut stopped = self.inner.stopped.lock();
            *stopped = true;
            self.inner.wake.notify_all();
        }
        if let Some(handle) = self.janitor.lock().take() {
            let _ = handle.join();
        }
        self.inner.entries.lock().clear();
    }
}

fn janitor_loop(inner: &MapInner) {
    loop {
        {
            let mut stopped = inner.stopped.lock();
            if *stopped {
                return;
            }
            inner.wake.wait_for(&mut stopped, inner.sweep_interval);
            if *stopped {
                return;
            }
        }
        sweep(inner);
    }
}

fn sweep(inner: &MapInner) {
    let now = monotonic_nanos();
    let ttl = inner.idle_ttl.as_nanos() as u64;

    let mut entries = inner.entries.lock();
    let before = entries.len();
    // strong_count == 1 means only the map holds the slot: nobody is
    // mid-acquire or holding the lock.
    entries.retain(|_, entry| {
        Arc::strong_count(entry) > 1
            || now.saturating_sub(entry.last_use.load(Ordering::Relaxed)) <= ttl
    });
    let dropped = before - entries.len();
    if dropped > 0 {
        trace!(dropped, remaining = entries.len(), "lock sweep");
    }
}
