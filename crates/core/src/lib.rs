//! Core types for the retrace revision engine
//!
//! This crate defines the foundational types used throughout the system:
//! - Object: the JSON-shaped value model for tracked resources
//! - DiffMap: structural change-sets over nested maps (`diffmap` module)
//! - RevisionId, Snapshot, Patch, Record: the revision data model
//! - Timestamp: microsecond wall-clock timestamps carried by records
//! - Error: the error taxonomy shared by the store and the tracker
//! - CancelToken: cooperative cancellation for store-touching operations
//! - RevisionStore: the trait every store backend implements

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod diffmap;
pub mod error;
pub mod object;
pub mod revision;
pub mod timestamp;
pub mod traits;

pub use cancel::CancelToken;
pub use diffmap::{apply, diff, DiffMap};
pub use error::{Error, Result};
pub use object::{resource_version, uid, Object};
pub use revision::{Patch, Record, RevisionId, Snapshot};
pub use timestamp::Timestamp;
pub use traits::RevisionStore;
