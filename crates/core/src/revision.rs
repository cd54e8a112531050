//! Revision data model
//!
//! Every tracked object is an append-only chain of records. A [`Snapshot`]
//! carries the complete object value at a revision; a [`Patch`] carries the
//! structural delta from the previous revision. A chain is restorable as
//! long as walking `previous_id` from any patch eventually lands on a
//! snapshot; revision 0 is always one.
//!
//! Record bodies serialize with one-byte field names to keep per-revision
//! overhead small on the wire and on disk.

use crate::diffmap::DiffMap;
use crate::object::Object;
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-object monotonic revision number.
///
/// Assigned by the store at write time, starting at 0 for each object with
/// no gaps. Only meaningful paired with its object UID.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RevisionId(u64);

impl RevisionId {
    /// The first revision of any object.
    pub const ZERO: RevisionId = RevisionId(0);

    /// Create a revision id from its numeric value.
    #[inline]
    pub const fn new(id: u64) -> Self {
        RevisionId(id)
    }

    /// Numeric value of this revision id.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The revision id directly after this one.
    #[inline]
    pub const fn next(&self) -> Self {
        RevisionId(self.0 + 1)
    }

    /// Whether this is revision 0.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RevisionId {
    /// Revision ids render as lowercase zero-padded hexadecimal.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for RevisionId {
    fn from(id: u64) -> Self {
        RevisionId(id)
    }
}

/// A complete object value at a revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// ID of this revision. Filled by the store at write time.
    #[serde(rename = "i")]
    pub id: RevisionId,
    /// ID of the previous revision; 0 for an object's first revision.
    #[serde(rename = "p", default, skip_serializing_if = "RevisionId::is_zero")]
    pub previous_id: RevisionId,
    /// The full object body at this revision.
    #[serde(rename = "o")]
    pub object: Object,
    /// When this revision was committed.
    #[serde(rename = "t")]
    pub time: Timestamp,
}

impl Snapshot {
    /// Build a snapshot awaiting id assignment by the store.
    pub fn new(previous_id: RevisionId, object: Object) -> Self {
        Snapshot {
            id: RevisionId::ZERO,
            previous_id,
            object,
            time: Timestamp::now(),
        }
    }
}

/// The structural delta from the previous revision to this one.
///
/// Meaningless without a reachable [`Snapshot`] earlier in its chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// ID of this revision. Filled by the store at write time.
    #[serde(rename = "i")]
    pub id: RevisionId,
    /// ID of the previous revision. Always set: a patch cannot be an
    /// object's first revision.
    #[serde(rename = "p", default, skip_serializing_if = "RevisionId::is_zero")]
    pub previous_id: RevisionId,
    /// Change-set from `previous_id` to `id`. May be empty when the
    /// committed object only differed in fields the producer strips.
    #[serde(rename = "d")]
    pub diff: DiffMap,
    /// When this revision was committed.
    #[serde(rename = "t")]
    pub time: Timestamp,
}

impl Patch {
    /// Build a patch awaiting id assignment by the store.
    pub fn new(previous_id: RevisionId, diff: DiffMap) -> Self {
        Patch {
            id: RevisionId::ZERO,
            previous_id,
            diff,
            time: Timestamp::now(),
        }
    }
}

/// A stored revision record: exactly one of snapshot or patch.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A full object value.
    Snapshot(Snapshot),
    /// A delta from the previous revision.
    Patch(Patch),
}

impl Record {
    /// The revision id this record was stored under.
    pub fn id(&self) -> RevisionId {
        match self {
            Record::Snapshot(s) => s.id,
            Record::Patch(p) => p.id,
        }
    }

    /// The previous revision id in this record's chain.
    pub fn previous_id(&self) -> RevisionId {
        match self {
            Record::Snapshot(s) => s.previous_id,
            Record::Patch(p) => p.previous_id,
        }
    }

    /// Commit time carried by the record.
    pub fn time(&self) -> Timestamp {
        match self {
            Record::Snapshot(s) => s.time,
            Record::Patch(p) => p.time,
        }
    }

    /// Whether this record is a snapshot.
    pub fn is_snapshot(&self) -> bool {
        matches!(self, Record::Snapshot(_))
    }

    /// Borrow the snapshot, if this record is one.
    pub fn as_snapshot(&self) -> Option<&Snapshot> {
        match self {
            Record::Snapshot(s) => Some(s),
            Record::Patch(_) => None,
        }
    }

    /// Borrow the patch, if this record is one.
    pub fn as_patch(&self) -> Option<&Patch> {
        match self {
            Record::Snapshot(_) => None,
            Record::Patch(p) => Some(p),
        }
    }
}
