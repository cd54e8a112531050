//! Revision store backends
//!
//! Two implementations of [`retrace_core::RevisionStore`]:
//!
//! - [`RedbStore`]: the durable store. Records and per-object latest
//!   pointers live in a redb database; revision ids are allocated inside
//!   the same write transaction that persists the record.
//! - [`MemoryStore`]: the ephemeral store, for tests and callers that do
//!   not need persistence.
//!
//! The on-disk record format is a one-byte type tag followed by a
//! MessagePack body with one-byte field names (see [`codec`]).

pub mod codec;
pub mod keys;
pub mod memory;
pub mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::{RedbStore, StoreOptions};
