//! Response cache for generated layer content.
//!
//! One bounded store keyed by `{layer, request, format}` with two budgets,
//! entry count and memory, enforced synchronously on every write, plus
//! layer-scoped invalidation for targeted busting after data reloads.
//!
//! Behavior is controlled via `strato.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! max_items = 10000
//! max_memory_mb = 1024
//! ```

mod config;
mod key;
pub(crate) mod lock;
mod store;

pub use config::CacheConfig;
pub use key::{CacheKey, OutputFormat, RequestKind};
pub use store::{
    CacheEntry, CacheError, CacheStats, METRIC_EVICT, METRIC_HIT, METRIC_MISS, TileCache,
};
