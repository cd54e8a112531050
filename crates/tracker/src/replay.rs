//! Cold-start replay
//!
//! Rebuilds the latest materialized state of every tracked object from a
//! single ordered walk of the store, then warms the tracker's cache. The
//! walk is a derived view: nothing here writes to the store.
//!
//! Runs single-threaded before any producer starts committing, which is
//! what makes the unconditional `warm_cache` overwrites safe.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use retrace_core::diffmap::apply;
use retrace_core::{CancelToken, Record, Result, RevisionStore, Snapshot};

use crate::tracker::Tracker;

/// Counters from a replay pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayStats {
    /// Objects whose state was rebuilt.
    pub objects: usize,
    /// Total records visited.
    pub revisions: u64,
}

/// Rebuild every object's latest state from `store` and warm `tracker`'s
/// cache with it.
///
/// Objects whose chain starts with a patch (no base snapshot) are skipped
/// with a warning; the rest of the store is unaffected.
pub fn warm_from_store<S: RevisionStore>(
    ctx: &CancelToken,
    store: &S,
    tracker: &Tracker<S>,
) -> Result<ReplayStats> {
    let mut states: HashMap<String, Snapshot> = HashMap::new();
    let mut broken: HashSet<String> = HashSet::new();
    let mut revisions = 0u64;

    store.walk_revisions(ctx, &mut |uid, rev, record| {
        revisions += 1;
        match record {
            Record::Snapshot(snapshot) => {
                let mut snapshot = snapshot.clone();
                snapshot.id = rev;
                states.insert(uid.to_string(), snapshot);
            }
            Record::Patch(patch) => match states.get_mut(uid) {
                Some(state) => {
                    apply(&mut state.object, &patch.diff);
                    state.previous_id = patch.previous_id;
                    state.id = rev;
                    state.time = patch.time;
                }
                None => {
                    if broken.insert(uid.to_string()) {
                        warn!(uid, rev = rev.as_u64(), "patch without base snapshot, skipping object");
                    }
                }
            },
        }
        true
    })?;

    for uid in &broken {
        states.remove(uid);
    }

    let objects = states.len();
    for (uid, snapshot) in &states {
        tracker.warm_cache(uid, snapshot);
    }

    debug!(objects, revisions, "replay complete");
    Ok(ReplayStats { objects, revisions })
}
