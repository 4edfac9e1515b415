//! Cache configuration.
//!
//! Bounds the idle-entry pool and drives the eviction sweep and the
//! invalidation consumer. Populated from the `[cache]` settings section.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_MAX_IDLE_ENTRIES: usize = 256;
const DEFAULT_KEEP_UNUSED_SECS: u64 = 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries kept without subscribers before LRU eviction.
    pub max_idle_entries: usize,
    /// How long an entry may sit without subscribers before the sweep drops it.
    pub keep_unused_secs: u64,
    /// Period of the background sweeper, when one is spawned.
    pub sweep_interval_secs: u64,
    /// Maximum invalidation events merged into one plan.
    pub consume_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_idle_entries: DEFAULT_MAX_IDLE_ENTRIES,
            keep_unused_secs: DEFAULT_KEEP_UNUSED_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            max_idle_entries: settings.max_idle_entries.get(),
            keep_unused_secs: settings.keep_unused_for.as_secs(),
            sweep_interval_secs: settings.sweep_interval.as_secs(),
            consume_batch_limit: settings.consume_batch_limit.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the idle bound as NonZeroUsize, clamping to 1 if zero.
    pub fn max_idle_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_idle_entries).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn keep_unused_for(&self) -> Duration {
        Duration::from_secs(self.keep_unused_secs)
    }

    /// Sweep period, never shorter than one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn consume_batch_limit(&self) -> usize {
        self.consume_batch_limit.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.max_idle_entries, 256);
        assert_eq!(config.keep_unused_for(), Duration::from_secs(60));
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
        assert_eq!(config.consume_batch_limit(), 100);
    }

    #[test]
    fn zero_values_are_clamped() {
        let config = CacheConfig {
            max_idle_entries: 0,
            keep_unused_secs: 0,
            sweep_interval_secs: 0,
            consume_batch_limit: 0,
        };
        assert_eq!(config.max_idle_entries_non_zero().get(), 1);
        assert_eq!(config.keep_unused_for(), Duration::ZERO);
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.consume_batch_limit(), 1);
    }

    #[test]
    fn deserializes_partial_tables() {
        let config: CacheConfig =
            serde_json::from_value(serde_json::json!({ "max_idle_entries": 8 }))
                .expect("partial config");
        assert_eq!(config.max_idle_entries, 8);
        assert_eq!(config.keep_unused_secs, 60);
    }
}
