//! Key/value store abstraction
//!
//! The timeline only needs a handful of primitives from its cache: ordered
//! lists with bounded length, integer counters that are atomic on the server,
//! plain strings with expiry and small hashes. Redis provides all of them;
//! [`crate::MemoryStore`] mirrors the same semantics in-process.

use crate::CacheResult;
use std::collections::HashMap;

/// Outcome of a conditional push to the front of a list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontPush {
    Pushed,
    /// The list does not exist; nothing was written
    Missing,
    /// The head is at least as new as the value (or unreadable); nothing was written
    Stale,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Whether the key currently exists (expired keys do not)
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Read list elements `start..=stop`; negative indexes count from the tail
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> CacheResult<Vec<String>>;

    /// Atomically replace the list at `key` with `values` and set its expiry
    async fn list_replace(&self, key: &str, values: &[String], ttl_secs: u64) -> CacheResult<()>;

    /// In one atomic step: push `value` (a scored entry, see
    /// [`crate::codec::encode_entry`]) to the front of an existing list when
    /// `score` is strictly greater than the head entry's score, then trim the
    /// list to `max_len`.
    async fn list_push_front_newer(
        &self,
        key: &str,
        value: &str,
        score: i64,
        max_len: usize,
    ) -> CacheResult<FrontPush>;

    /// Add `delta` to an existing integer key in one server-side step.
    /// Returns `None` when the key does not exist.
    async fn incr_existing(&self, key: &str, delta: i64) -> CacheResult<Option<i64>>;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()>;

    async fn del(&self, key: &str) -> CacheResult<()>;

    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, String>>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> CacheResult<()>;
}
