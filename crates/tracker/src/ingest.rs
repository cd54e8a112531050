//! Event ingest: the seam between an external producer and the tracker
//!
//! Producers deliver at-least-once; the tracker's duplicate suppression
//! turns redeliveries into no-ops. Objects whose chains turn out corrupt
//! are skipped so one bad object cannot stall the stream.

use std::collections::HashSet;

use tracing::warn;

use retrace_core::{object, CancelToken, Object, Result, RevisionStore};

use crate::tracker::Tracker;

/// What happened to a watched object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The object appeared.
    Added,
    /// The object changed.
    Modified,
    /// The object went away; the event carries its last body.
    Deleted,
}

/// One observed object version.
#[derive(Debug, Clone)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// The full object body, carrying at least `metadata.uid`.
    pub object: Object,
}

/// Counters from a pump run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PumpStats {
    /// Events committed as new revisions.
    pub committed: u64,
    /// Events suppressed as duplicate resource versions.
    pub duplicates: u64,
    /// Events rejected by the filter predicate.
    pub filtered: u64,
    /// Events dropped: no uid, or the object's chain is corrupt.
    pub dropped: u64,
}

/// Drain `events` into `tracker`.
///
/// `filter` runs before commit; rejection drops the event. Duplicate
/// resource versions count as already recorded. Corruption poisons only
/// the affected uid. I/O errors and cancellation stop the pump.
pub fn pump<S, I, F>(
    ctx: &CancelToken,
    tracker: &Tracker<S>,
    events: I,
    mut filter: F,
) -> Result<PumpStats>
where
    S: RevisionStore,
    I: IntoIterator<Item = Event>,
    F: FnMut(&Event) -> bool,
{
    let mut stats = PumpStats::default();
    let mut poisoned: HashSet<String> = HashSet::new();

    for event in events {
        ctx.check()?;

        if !filter(&event) {
            stats.filtered += 1;
            continue;
        }

        let Some(uid) = object::uid(&event.object).map(str::to_string) else {
            warn!("event object has no metadata.uid, dropping");
            stats.dropped += 1;
            continue;
        };
        if poisoned.contains(&uid) {
            stats.dropped += 1;
            continue;
        }

        match tracker.commit(ctx, &uid, &event.object) {
            Ok(_) => stats.committed += 1,
            Err(e) if e.is_duplicate() => stats.duplicates += 1,
            Err(e) if e.is_corruption() => {
                warn!(uid = %uid, error = %e, "revision chain is corrupt, skipping object");
                poisoned.insert(uid);
                stats.dropped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(stats)
}
