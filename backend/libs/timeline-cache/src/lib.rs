//! Timeline cache layer
//!
//! Bounded, self-healing caches in front of the timeline's durable stores:
//! - Newest-first record lists (post timelines, feeds) via [`CachedOrderedList`]
//! - Entity counters (likes, comments) via [`CachedCounter`]
//!
//! The cache is always a projection. Every structure can be rebuilt from the
//! durable store, and every operation degrades to the durable store when the
//! key/value backend is slow or down.

pub mod codec;
pub mod config;
pub mod counter;
pub mod error;
pub mod keys;
pub mod list;
pub mod memory_store;
pub mod metrics;
pub mod redis_store;
pub mod store;

pub use config::CacheConfig;
pub use counter::CachedCounter;
pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, CounterRef, CACHE_VERSION};
pub use list::CachedOrderedList;
pub use memory_store::MemoryStore;
pub use metrics::CacheMetrics;
pub use redis_store::RedisStore;
pub use codec::ListRecord;
pub use store::{FrontPush, KeyValueStore};

#[cfg(test)]
pub use store::MockKeyValueStore;
