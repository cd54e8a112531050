//! Monotonic nanosecond clock for cache recency and lock idle tracking.

use once_cell::sync::Lazy;
use std::time::Instant;

static START: Lazy<Instant> = Lazy::new(Instant::now);

/// Nanoseconds since the first call site touched the clock. Monotonic,
/// unaffected by wall-clock steps.
pub(crate) fn monotonic_nanos() -> u64 {
    START.elapsed().as_nanos() as u64
}
