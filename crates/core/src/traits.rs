//! The store abstraction every backend implements
//!
//! Defining the trait here lets the tracker work against any backend (the
//! durable redb store, the in-memory store, test doubles) without a
//! dependency on the storage crate.

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::revision::{Patch, Record, RevisionId, Snapshot};

/// Append-only, per-object revision storage with transactional writes.
///
/// Implementations assign revision ids: each write allocates the next id
/// for the object inside the same transaction that persists the record and
/// advances the per-object latest pointer. Either all of that is durable or
/// none of it is.
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads. Writers to the same uid are serialized by the
/// implementation's transaction layer; the tracker adds a per-uid lock on
/// top to keep diffs minimal, not for correctness.
pub trait RevisionStore: Send + Sync {
    /// Persist a snapshot under the next revision id for `uid`.
    ///
    /// The `id` field of `snapshot` is ignored; the store fills it with
    /// the assigned value and returns it.
    fn set_snapshot(&self, ctx: &CancelToken, uid: &str, snapshot: Snapshot) -> Result<RevisionId>;

    /// Persist a patch under the next revision id for `uid`.
    ///
    /// `patch.previous_id` must equal the current latest revision for
    /// `uid` at the moment of the write. The store does not validate this;
    /// the tracker guarantees it.
    fn set_patch(&self, ctx: &CancelToken, uid: &str, patch: Patch) -> Result<RevisionId>;

    /// Fetch the record stored under `(uid, id)`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent; `InvalidRevision` if the stored
    /// blob's type tag is unrecognized.
    fn get(&self, ctx: &CancelToken, uid: &str, id: RevisionId) -> Result<Record>;

    /// The most recently assigned revision id for `uid`.
    ///
    /// May be served from an in-memory hot map kept consistent with the
    /// durable pointer. `NotFound` if the uid is unknown.
    fn latest_revision(&self, ctx: &CancelToken, uid: &str) -> Result<RevisionId>;

    /// Iterate every record in ascending `(uid, id)` order.
    ///
    /// Invokes `visit` for each record; iteration stops early when `visit`
    /// returns `false`. Used for cold-start replay.
    fn walk_revisions(
        &self,
        ctx: &CancelToken,
        visit: &mut dyn FnMut(&str, RevisionId, &Record) -> bool,
    ) -> Result<()>;

    /// Flush deferred writes and release resources.
    fn close(&self) -> Result<()>;
}
