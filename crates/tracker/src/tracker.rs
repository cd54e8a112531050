//! The tracker: snapshot-vs-patch decisions, per-object serialization,
//! duplicate suppression, and chain restore.

use std::sync::Arc;

use tracing::{debug, trace};

use retrace_core::diffmap::{apply, diff};
use retrace_core::object::resource_version;
use retrace_core::{
    CancelToken, Error, Object, Patch, Record, Result, RevisionId, RevisionStore, Snapshot,
};

use crate::cache::{CachedState, StateCache};
use crate::config::{TrackerConfig, DEFAULT_SNAPSHOT_INTERVAL};
use crate::locks::LockMap;

/// Tracks object versions as an append-only snapshot/patch chain.
///
/// Commits to one object are strictly serialized by a per-uid lock held
/// for the whole read-previous → diff → write window; different objects
/// proceed fully in parallel. The store below assigns revision ids, so
/// ids are dense and monotonic per object.
pub struct Tracker<S> {
    store: Arc<S>,
    snapshot_interval: u64,
    cache: Option<StateCache>,
    locks: LockMap,
}

impl<S: RevisionStore> Tracker<S> {
    /// Create a tracker over `store`.
    pub fn new(store: Arc<S>, config: TrackerConfig) -> Self {
        let snapshot_interval = if config.snapshot_interval == 0 {
            DEFAULT_SNAPSHOT_INTERVAL
        } else {
            config.snapshot_interval
        };
        Tracker {
            store,
            snapshot_interval,
            cache: config.cache.map(StateCache::new),
            locks: LockMap::new(),
        }
    }

    /// The store this tracker writes to.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Append one revision for `uid` reflecting `object`.
    ///
    /// Returns the assigned revision id, or
    /// [`Error::DuplicateResourceVersion`] when `object` carries the same
    /// `metadata.resourceVersion` as the current revision (nothing is
    /// written in that case).
    pub fn commit(&self, ctx: &CancelToken, uid: &str, object: &Object) -> Result<RevisionId> {
        ctx.check()?;

        let slot = self.locks.entry(uid);
        let _guard = slot.mu.lock();

        // Fast path: previous state is hot.
        if let Some(entry) = self.cache.as_ref().and_then(|c| c.get(uid)) {
            let mut state = entry.state();
            let assigned = self.write_revision(ctx, uid, state.revision, &state.object, object)?;
            state.object = object.clone();
            state.revision = assigned;
            return Ok(assigned);
        }

        let latest = match self.store.latest_revision(ctx, uid) {
            Ok(latest) => latest,
            Err(e) if e.is_not_found() => {
                // First commit for this object: always a full snapshot.
                let assigned = self.store.set_snapshot(
                    ctx,
                    uid,
                    Snapshot::new(RevisionId::ZERO, object.clone()),
                )?;
                self.cache_state(uid, object, assigned);
                debug!(uid, "tracking new object");
                return Ok(assigned);
            }
            Err(e) => return Err(e),
        };

        let previous = self.restore_chain(ctx, uid, latest)?;
        let assigned = self.write_revision(ctx, uid, latest, &previous.object, object)?;
        self.cache_state(uid, object, assigned);
        Ok(assigned)
    }

    /// Materialize the object state at `rev`.
    pub fn restore(&self, ctx: &CancelToken, uid: &str, rev: RevisionId) -> Result<Snapshot> {
        ctx.check()?;
        let snapshot = self.restore_chain(ctx, uid, rev)?;

        if let Some(cache) = &self.cache {
            // cache.get refreshes recency when an entry exists; only a
            // restore of the newest revision may create one, and only
            // under the uid lock so a racing commit cannot be overwritten
            // with older state.
            if cache.get(uid).is_none() {
                let slot = self.locks.entry(uid);
                let _guard = slot.mu.lock();
                if cache.get(uid).is_none()
                    && matches!(self.store.latest_revision(ctx, uid), Ok(latest) if latest == rev)
                {
                    cache.set(
                        uid,
                        CachedState {
                            object: snapshot.object.clone(),
                            revision: rev,
                        },
                    );
                }
            }
        }
        Ok(snapshot)
    }

    /// Overwrite the cache entry for `uid` with a known-current snapshot.
    ///
    /// For cold-start loaders only: callers must ensure no commit for
    /// `uid` is in flight, which replay guarantees by running
    /// single-threaded before producers start.
    pub fn warm_cache(&self, uid: &str, snapshot: &Snapshot) {
        if let Some(cache) = &self.cache {
            cache.set(
                uid,
                CachedState {
                    object: snapshot.object.clone(),
                    revision: snapshot.id,
                },
            );
        }
    }

    /// Stop the lock and cache janitors and release their entries. Does
    /// not close the store; that is the caller's responsibility.
    pub fn close(&self) {
        self.locks.close();
        if let Some(cache) = &self.cache {
            cache.close();
        }
    }

    /// Whether the revision `rev` must be written as a full snapshot.
    fn snapshot_due(&self, rev: RevisionId) -> bool {
        let r = rev.as_u64();
        r == 0 || r % self.snapshot_interval == self.snapshot_interval - 1
    }

    /// Duplicate-check, decide snapshot-vs-patch, and write. The caller
    /// holds the per-uid lock and `prev_rev` is the object's latest
    /// revision.
    fn write_revision(
        &self,
        ctx: &CancelToken,
        uid: &str,
        prev_rev: RevisionId,
        prev_object: &Object,
        object: &Object,
    ) -> Result<RevisionId> {
        if let (Some(prev_rv), Some(new_rv)) =
            (resource_version(prev_object), resource_version(object))
        {
            if prev_rv == new_rv {
                trace!(uid, resource_version = new_rv, "suppressed duplicate");
                return Err(Error::DuplicateResourceVersion {
                    rev: prev_rev,
                    resource_version: new_rv.to_string(),
                });
            }
        }

        // Last cancellation point before the write transaction; the
        // transaction itself is atomic.
        ctx.check()?;

        let next = prev_rev.next();
        let assigned = if self.snapshot_due(next) {
            self.store
                .set_snapshot(ctx, uid, Snapshot::new(prev_rev, object.clone()))?
        } else {
            let change = diff(prev_object, object).unwrap_or_default();
            self.store.set_patch(ctx, uid, Patch::new(prev_rev, change))?
        };
        trace!(uid, rev = assigned.as_u64(), "committed revision");
        Ok(assigned)
    }

    fn cache_state(&self, uid: &str, object: &Object, revision: RevisionId) {
        if let Some(cache) = &self.cache {
            cache.set(
                uid,
                CachedState {
                    object: object.clone(),
                    revision,
                },
            );
        }
    }

    /// Walk backward from `rev` to the nearest snapshot, then apply the
    /// collected patches earliest-first onto a copy of it.
    fn restore_chain(&self, ctx: &CancelToken, uid: &str, rev: RevisionId) -> Result<Snapshot> {
        let mut chain: Vec<Patch> = Vec::new();
        let mut cur = rev;
        loop {
            let record = match self.store.get(ctx, uid, cur) {
                Ok(record) => record,
                Err(e) if e.is_not_found() && chain.is_empty() => {
                    // the requested revision itself does not exist
                    return Err(e);
                }
                Err(e) if e.is_not_found() => {
                    return Err(Error::Corruption(format!(
                        "no base snapshot found for revision {rev}"
                    )));
                }
                Err(e) => return Err(e),
            };
            match record {
                Record::Snapshot(snapshot) => {
                    let mut object = snapshot.object;
                    for patch in chain.iter().rev() {
                        apply(&mut object, &patch.diff);
                    }
                    return Ok(Snapshot {
                        id: rev,
                        previous_id: chain
                            .first()
                            .map(|p| p.previous_id)
                            .unwrap_or(snapshot.previous_id),
                        object,
                        time: snapshot.time,
                    });
                }
                Record::Patch(patch) => {
                    if patch.previous_id >= cur {
                        return Err(Error::Corruption(format!(
                            "revision chain does not decrease at {cur}"
                        )));
                    }
                    cur = patch.previous_id;
                    chain.push(patch);
                }
            }
        }
    }
}
