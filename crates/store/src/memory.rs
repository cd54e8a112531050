//! In-memory revision store
//!
//! Same contract as the durable store, backed by a `BTreeMap` behind a
//! reader/writer lock. Nothing survives the process; meant for tests and
//! for callers that only need the tracker's in-process behavior.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use retrace_core::{
    CancelToken, Error, Patch, Record, Result, RevisionId, RevisionStore, Snapshot,
};

#[derive(Default)]
struct Inner {
    /// (uid, id) -> record, ordered the way `walk_revisions` yields.
    records: BTreeMap<(String, u64), Record>,
    /// uid -> next revision id to allocate.
    next: HashMap<String, u64>,
}

/// Ephemeral revision store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn append(&self, ctx: &CancelToken, uid: &str, mut record: Record) -> Result<RevisionId> {
        ctx.check()?;

        let mut inner = self.inner.write();
        let next = inner.next.get(uid).copied().unwrap_or(0);
        let assigned = RevisionId::new(next);
        match &mut record {
            Record::Snapshot(s) => s.id = assigned,
            Record::Patch(p) => p.id = assigned,
        }
        inner.records.insert((uid.to_string(), next), record);
        inner.next.insert(uid.to_string(), next + 1);
        Ok(assigned)
    }
}

impl RevisionStore for MemoryStore {
    fn set_snapshot(&self, ctx: &CancelToken, uid: &str, snapshot: Snapshot) -> Result<RevisionId> {
        self.append(ctx, uid, Record::Snapshot(snapshot))
    }

    fn set_patch(&self, ctx: &CancelToken, uid: &str, patch: Patch) -> Result<RevisionId> {
        self.append(ctx, uid, Record::Patch(patch))
    }

    fn get(&self, ctx: &CancelToken, uid: &str, id: RevisionId) -> Result<Record> {
        ctx.check()?;
        self.inner
            .read()
            .records
            .get(&(uid.to_string(), id.as_u64()))
            .cloned()
            .ok_or(Error::NotFound)
    }

    fn latest_revision(&self, ctx: &CancelToken, uid: &str) -> Result<RevisionId> {
        ctx.check()?;
        match self.inner.read().next.get(uid) {
            Some(&next) => Ok(RevisionId::new(next - 1)),
            None => Err(Error::NotFound),
        }
    }

    fn walk_revisions(
        &self,
        ctx: &CancelToken,
        visit: &mut dyn FnMut(&str, RevisionId, &Record) -> bool,
    ) -> Result<()> {
        ctx.check()?;
        for ((uid, id), record) in self.inner.read().records.iter() {
            if !visit(uid, RevisionId::new(*id), record) {
                break;
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
