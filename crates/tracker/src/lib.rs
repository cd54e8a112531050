//! The revision tracker
//!
//! Turns a stream of object versions into a snapshot/patch chain:
//!
//! - [`Tracker`]: accepts new object versions, serializes commits per
//!   object, decides snapshot-vs-patch, suppresses duplicates, restores
//!   any revision by chain replay.
//! - [`StateCache`]: bounded hot cache of the latest materialized state
//!   per object, with TTL and popularity-biased eviction.
//! - [`replay`]: cold-start loader that rebuilds current state from a
//!   store walk and warms the cache.
//! - [`ingest`]: the seam between an external event producer and the
//!   tracker.

pub mod cache;
mod clock;
pub mod config;
pub mod ingest;
mod locks;
pub mod replay;
pub mod tracker;

pub use cache::{CachedState, StateCache};
pub use config::{CacheConfig, TrackerConfig};
pub use ingest::{pump, Event, EventKind, PumpStats};
pub use replay::{warm_from_store, ReplayStats};
pub use tracker::Tracker;
