//! Store-facing cache configuration.

use serde::Deserialize;

pub const DEFAULT_MAX_ITEMS: usize = 10_000;
pub const DEFAULT_MAX_MEMORY_MB: u64 = 1024;

/// Budgets and the master switch for the response store. This is the
/// subset of the `[cache]` settings the store itself consumes; admin
/// surface knobs (API key, browser max-age) stay in `crate::config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_items: usize,
    pub max_memory_mb: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_items: DEFAULT_MAX_ITEMS,
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            max_items: settings.max_items,
            max_memory_mb: settings.max_memory_mb,
        }
    }
}

impl CacheConfig {
    /// Memory budget in bytes (`max_memory_mb` MiB).
    pub fn max_bytes(&self) -> u64 {
        self.max_memory_mb.saturating_mul(1024 * 1024)
    }
}
