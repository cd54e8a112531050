//! Error taxonomy shared by the store and the tracker
//!
//! Errors are classified by kind, not by origin: callers match on the
//! variant to decide whether an error is routine (duplicate suppression),
//! fatal for one object (corruption), or fatal for the operation (storage
//! failure). `DuplicateResourceVersion` is the only error a well-behaved
//! caller routinely ignores.

use crate::revision::RevisionId;
use std::io;
use thiserror::Error;

/// Result type alias for retrace operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the store and the tracker.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested object or revision is not in the store.
    #[error("not found")]
    NotFound,

    /// A stored record has an unknown type tag or an unparseable body.
    #[error("invalid revision record: {0}")]
    InvalidRevision(String),

    /// A commit carried the same `metadata.resourceVersion` as the
    /// current revision. The caller treats the event as already recorded.
    #[error("resourceVersion {resource_version:?} already recorded at revision {rev}")]
    DuplicateResourceVersion {
        /// Revision that already carries this resource version.
        rev: RevisionId,
        /// The duplicated resource version string.
        resource_version: String,
    },

    /// The caller's cancellation token fired before the write committed.
    #[error("operation cancelled")]
    Cancelled,

    /// A revision chain is broken (no reachable base snapshot). Fatal for
    /// the affected object; other objects are unaffected.
    #[error("corrupt revision chain: {0}")]
    Corruption(String),

    /// An underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A storage-engine failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Encoding or decoding a record body failed. Treated like an I/O
    /// failure by callers.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Wrap a storage-engine error.
    pub fn storage(err: impl ToString) -> Self {
        Error::Storage(err.to_string())
    }

    /// Wrap a codec error.
    pub fn serialization(err: impl ToString) -> Self {
        Error::Serialization(err.to_string())
    }

    /// Whether this is the not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    /// Whether this is duplicate suppression firing, the one routine,
    /// ignorable error.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::DuplicateResourceVersion { .. })
    }

    /// Whether the caller's cancellation fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Whether the affected object's chain is unrecoverable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::InvalidRevision(_))
    }
}
