//! Tracker and cache configuration.

use std::time::Duration;

/// Snapshot cadence used when the configured interval is zero.
pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 8;

/// Configuration for a [`Tracker`](crate::Tracker).
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// A full snapshot is written at every revision `r` with
    /// `r % snapshot_interval == snapshot_interval - 1` (and at revision
    /// 0), bounding restore cost to `snapshot_interval - 1` patch
    /// applications. Zero falls back to the default.
    pub snapshot_interval: u64,
    /// Hot state cache settings; `None` disables the cache entirely.
    /// Every functional guarantee holds without it, each commit just pays
    /// a restore from the store for the previous state.
    pub cache: Option<CacheConfig>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            cache: Some(CacheConfig::default()),
        }
    }
}

impl TrackerConfig {
    /// Config with the given snapshot interval and default cache settings.
    pub fn with_snapshot_interval(snapshot_interval: u64) -> Self {
        TrackerConfig {
            snapshot_interval,
            ..TrackerConfig::default()
        }
    }

    /// Config with the cache disabled.
    pub fn without_cache(snapshot_interval: u64) -> Self {
        TrackerConfig {
            snapshot_interval,
            cache: None,
        }
    }
}

/// Settings for the hot state cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How often the janitor sweeps for cold entries.
    pub sweep_interval: Duration,
    /// A never-read entry expires after this long.
    pub ttl_base: Duration,
    /// Each recorded read extends an entry's TTL by this much.
    pub ttl_hit_bonus: Duration,
    /// Hard cap on cached entries; inserts beyond it are dropped.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            sweep_interval: Duration::from_secs(10),
            ttl_base: Duration::from_secs(40),
            ttl_hit_bonus: Duration::from_secs(4),
            max_entries: 100_000,
        }
    }
}
