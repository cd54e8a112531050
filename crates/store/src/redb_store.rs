//! Durable revision store on redb
//!
//! Layout: a `records` table keyed `uid || '|' || be-u64(id)` holding
//! tag-prefixed MessagePack blobs, and a `latest` table keyed `uid` holding
//! `be-u64(latest + 1)`, i.e. the next id to allocate.
//!
//! Id allocation happens inside the write transaction that also inserts
//! the record and advances the latest pointer, so a crash can never leave
//! a gap in an object's revision sequence. redb serializes write
//! transactions globally, which is what makes the allocation safe without
//! any extra locking here.
//!
//! A hot map of `uid -> next id` fronts the `latest` table so
//! `latest_revision` stays off disk on the steady path. It is rebuilt
//! lazily after reopen.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use redb::{Database, Durability, ReadableTable, TableDefinition};
use tracing::{debug, trace};

use retrace_core::{
    CancelToken, Error, Patch, Record, Result, RevisionId, RevisionStore, Snapshot,
};

use crate::codec;
use crate::keys;

const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");
const LATEST: TableDefinition<&[u8], &[u8]> = TableDefinition::new("latest");

/// Options for opening a [`RedbStore`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// When true, every committed transaction is flushed to stable storage
    /// before returning. When false, flushing is left to the OS for
    /// throughput; `close` flushes regardless.
    pub durable: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions { durable: true }
    }
}

/// Revision store backed by a redb database file.
pub struct RedbStore {
    db: Database,
    durable: bool,
    /// uid -> next revision id to allocate (latest + 1).
    head: RwLock<HashMap<String, u64>>,
}

impl RedbStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let db = Database::create(path.as_ref()).map_err(Error::storage)?;

        // Create both tables up front so readers never race table creation.
        let txn = db.begin_write().map_err(Error::storage)?;
        {
            txn.open_table(RECORDS).map_err(Error::storage)?;
            txn.open_table(LATEST).map_err(Error::storage)?;
        }
        txn.commit().map_err(Error::storage)?;

        debug!(path = %path.as_ref().display(), durable = options.durable, "opened revision store");
        Ok(RedbStore {
            db,
            durable: options.durable,
            head: RwLock::new(HashMap::new()),
        })
    }

    fn durability(&self) -> Durability {
        if self.durable {
            Durability::Immediate
        } else {
            Durability::Eventual
        }
    }

    /// Allocate the next id for `uid` and persist `record` under it, all
    /// in one write transaction.
    fn append(&self, ctx: &CancelToken, uid: &str, mut record: Record) -> Result<RevisionId> {
        ctx.check()?;

        let mut txn = self.db.begin_write().map_err(Error::storage)?;
        txn.set_durability(self.durability());

        let next;
        {
            let mut latest = txn.open_table(LATEST).map_err(Error::storage)?;
            next = match latest.get(uid.as_bytes()).map_err(Error::storage)? {
                Some(guard) => decode_next(guard.value())?,
                None => 0,
            };
            latest
                .insert(uid.as_bytes(), (next + 1).to_be_bytes().as_slice())
                .map_err(Error::storage)?;

            let assigned = RevisionId::new(next);
            match &mut record {
                Record::Snapshot(s) => s.id = assigned,
                Record::Patch(p) => p.id = assigned,
            }

            let key = keys::record_key(uid, assigned);
            let payload = codec::encode_record(&record)?;
            let mut records = txn.open_table(RECORDS).map_err(Error::storage)?;
            records
                .insert(key.as_slice(), payload.as_slice())
                .map_err(Error::storage)?;
        }

        // Hold the head lock across commit so the hot map advances in
        // commit order and never goes backwards.
        let mut head = self.head.write();
        txn.commit().map_err(Error::storage)?;
        head.insert(uid.to_string(), next + 1);
        drop(head);

        trace!(uid, rev = next, snapshot = record.is_snapshot(), "appended revision");
        Ok(RevisionId::new(next))
    }
}

impl RevisionStore for RedbStore {
    fn set_snapshot(&self, ctx: &CancelToken, uid: &str, snapshot: Snapshot) -> Result<RevisionId> {
        self.append(ctx, uid, Record::Snapshot(snapshot))
    }

    fn set_patch(&self, ctx: &CancelToken, uid: &str, patch: Patch) -> Result<RevisionId> {
        self.append(ctx, uid, Record::Patch(patch))
    }

    fn get(&self, ctx: &CancelToken, uid: &str, id: RevisionId) -> Result<Record> {
        ctx.check()?;

        let txn = self.db.begin_read().map_err(Error::storage)?;
        let records = txn.open_table(RECORDS).map_err(Error::storage)?;
        let key = keys::record_key(uid, id);
        match records.get(key.as_slice()).map_err(Error::storage)? {
            Some(guard) => codec::decode_record(guard.value()),
            None => Err(Error::NotFound),
        }
    }

    fn latest_revision(&self, ctx: &CancelToken, uid: &str) -> Result<RevisionId> {
        ctx.check()?;

        if let Some(&next) = self.head.read().get(uid) {
            return Ok(RevisionId::new(next - 1));
        }

        let txn = self.db.begin_read().map_err(Error::storage)?;
        let latest = txn.open_table(LATEST).map_err(Error::storage)?;
        let next = match latest.get(uid.as_bytes()).map_err(Error::storage)? {
            Some(guard) => decode_next(guard.value())?,
            None => return Err(Error::NotFound),
        };

        // A concurrent writer may already have advanced the hot map; keep
        // whichever value is there.
        let mut head = self.head.write();
        let next = *head.entry(uid.to_string()).or_insert(next);
        Ok(RevisionId::new(next - 1))
    }

    fn walk_revisions(
        &self,
        ctx: &CancelToken,
        visit: &mut dyn FnMut(&str, RevisionId, &Record) -> bool,
    ) -> Result<()> {
        ctx.check()?;

        let txn = self.db.begin_read().map_err(Error::storage)?;
        let records = txn.open_table(RECORDS).map_err(Error::storage)?;
        for entry in records.iter().map_err(Error::storage)? {
            let (key, value) = entry.map_err(Error::storage)?;
            let (uid, rev) = keys::split_record_key(key.value())?;
            let record = codec::decode_record(value.value())?;
            if !visit(uid, rev, &record) {
                break;
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if !self.durable {
            // An empty immediate-durability commit persists everything the
            // eventual commits left in the page cache.
            let mut txn = self.db.begin_write().map_err(Error::storage)?;
            txn.set_durability(Durability::Immediate);
            txn.commit().map_err(Error::storage)?;
        }
        debug!("closed revision store");
        Ok(())
    }
}

fn decode_next(bytes: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Corruption("latest pointer is not 8 bytes".to_string()))?;
    Ok(u64::from_be_bytes(bytes))
}
