//! Cache configuration.
//!
//! Sizes the entity store and the snapshot cache, and fixes the page size
//! shared by snapshot and live collection reads.

use std::num::{NonZeroU32, NonZeroUsize};
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_PAGE_SIZE: u32 = 5;
const DEFAULT_SNAPSHOT_STALENESS_SECS: u64 = 60;
const DEFAULT_COLLECTION_LIMIT: usize = 50;
const DEFAULT_SNAPSHOT_LIMIT: usize = 100;
const DEFAULT_PRERENDER_COUNT: usize = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Posts per collection page, for snapshots and live reads alike.
    pub page_size: u32,
    /// Maximum age of a served snapshot.
    pub snapshot_staleness_secs: u64,
    /// Maximum cached collection queries in the entity store.
    pub collection_limit: usize,
    /// Maximum cached snapshots.
    pub snapshot_limit: usize,
    /// Detail snapshots primed by a warm-up.
    pub prerender_count: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            snapshot_staleness_secs: DEFAULT_SNAPSHOT_STALENESS_SECS,
            collection_limit: DEFAULT_COLLECTION_LIMIT,
            snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            prerender_count: DEFAULT_PRERENDER_COUNT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            page_size: settings.page_size.get(),
            snapshot_staleness_secs: settings.snapshot_staleness_seconds.get(),
            collection_limit: settings.collection_limit.get(),
            snapshot_limit: settings.snapshot_limit.get(),
            prerender_count: settings.prerender_count,
        }
    }
}

impl CacheConfig {
    /// Page size clamped to at least one.
    pub fn page_size_non_zero(&self) -> NonZeroU32 {
        NonZeroU32::new(self.page_size).unwrap_or(NonZeroU32::MIN)
    }

    pub fn snapshot_staleness(&self) -> Duration {
        Duration::from_secs(self.snapshot_staleness_secs)
    }

    /// Returns the collection limit as NonZeroUsize, clamping to 1 if zero.
    pub fn collection_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.collection_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the snapshot limit as NonZeroUsize, clamping to 1 if zero.
    pub fn snapshot_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.snapshot_limit).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.page_size, 5);
        assert_eq!(config.snapshot_staleness(), Duration::from_secs(60));
        assert_eq!(config.collection_limit, 50);
        assert_eq!(config.snapshot_limit, 100);
        assert_eq!(config.prerender_count, 10);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            page_size: 0,
            collection_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.page_size_non_zero().get(), 1);
        assert_eq!(config.collection_limit_non_zero().get(), 1);
    }

    #[test]
    fn partial_table_keeps_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{ "page_size": 10 }"#).expect("config should parse");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.snapshot_limit, 100);
    }
}
