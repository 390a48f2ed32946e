//! Bounded newest-first list cache
//!
//! A cached list is a projection of a durable "newest first, limit N" query.
//! It is populated lazily on the first read, kept warm by explicit pushes from
//! every durable write path, and dropped (never patched) when its contents no
//! longer decode. A cache failure never fails the caller: the loader answers
//! instead.
//!
//! The list stays sorted by descending [`ListRecord::sort_key`]. A push only
//! lands at the front when it is strictly newer than the current head;
//! writers that finish out of order make the list reload from the loader.

use crate::codec::{self, ListRecord};
use crate::store::FrontPush;
use crate::{CacheConfig, CacheError, CacheMetrics, KeyValueStore};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct CachedOrderedList {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
    metrics: CacheMetrics,
}

impl CachedOrderedList {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            metrics: CacheMetrics::new(),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    /// Newest-first records for `key`, at most `list_length_limit` of them.
    ///
    /// `load(limit)` must return the durable store's newest `limit` rows.
    pub async fn get<T, E, F, Fut>(&self, key: &str, load: F) -> Result<Vec<T>, E>
    where
        T: Serialize + DeserializeOwned + ListRecord,
        F: FnOnce(usize) -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        let limit = self.config.list_length_limit;
        let raw = match self.store.list_range(key, 0, limit as isize - 1).await {
            Ok(raw) => raw,
            Err(e) => {
                self.degraded(key, "list_range", &e);
                return load(limit).await;
            }
        };

        if !raw.is_empty() {
            match codec::decode_entries::<T>(&raw) {
                Ok(records) => {
                    self.metrics.record_hit(key);
                    return Ok(records);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping undecodable cached list");
                    self.metrics.record_error(key, e.kind());
                    if let Err(e) = self.store.del(key).await {
                        self.degraded(key, "del", &e);
                        return load(limit).await;
                    }
                }
            }
        }

        self.metrics.record_miss(key);
        let records = load(limit).await?;
        self.populate(key, &records).await;
        Ok(records)
    }

    /// Put a freshly written record at the front of `key`'s list.
    ///
    /// Call this after the durable write has committed. When the list is not
    /// cached, or its head is not older than `record`, it is rebuilt from
    /// `load`, which already sees the new record.
    pub async fn push<T, E, F, Fut>(&self, key: &str, record: &T, load: F) -> Result<(), E>
    where
        T: Serialize + ListRecord,
        F: FnOnce(usize) -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        let encoded = match codec::encode_entry(record) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode record, invalidating list");
                self.metrics.record_error(key, e.kind());
                self.invalidate(key).await;
                return Ok(());
            }
        };

        match self
            .store
            .list_push_front_newer(
                key,
                &encoded,
                record.sort_key(),
                self.config.list_length_limit,
            )
            .await
        {
            Ok(FrontPush::Pushed) => {
                self.metrics.record_write(key);
                Ok(())
            }
            Ok(FrontPush::Missing) => {
                debug!(key = %key, "List not cached, populating from durable store");
                let records = load(self.config.list_length_limit).await?;
                self.populate(key, &records).await;
                Ok(())
            }
            Ok(FrontPush::Stale) => {
                debug!(key = %key, "Record is not newer than cached head, rebuilding list");
                if let Err(e) = self.store.del(key).await {
                    self.degraded(key, "del", &e);
                    return Ok(());
                }
                let records = load(self.config.list_length_limit).await?;
                self.populate(key, &records).await;
                Ok(())
            }
            Err(e) => {
                self.degraded(key, "list_push_front_newer", &e);
                Ok(())
            }
        }
    }

    /// Drop the cached list; the next read repopulates it
    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.del(key).await {
            self.degraded(key, "del", &e);
        }
    }

    async fn populate<T: Serialize + ListRecord>(&self, key: &str, records: &[T]) {
        if records.is_empty() {
            return;
        }
        let capped = &records[..records.len().min(self.config.list_length_limit)];
        let encoded = match codec::encode_entries(capped) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode records for cache");
                self.metrics.record_error(key, e.kind());
                return;
            }
        };

        match self
            .store
            .list_replace(key, &encoded, self.config.key_ttl_secs)
            .await
        {
            Ok(()) => self.metrics.record_write(key),
            Err(e) => self.degraded(key, "list_replace", &e),
        }
    }

    fn degraded(&self, key: &str, op: &'static str, error: &CacheError) {
        warn!(key = %key, op, error = %error, "Cache unavailable, using durable store");
        self.metrics.record_error(key, error.kind());
        self.metrics.record_fallback(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, MockKeyValueStore};
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    impl ListRecord for u32 {
        fn sort_key(&self) -> i64 {
            i64::from(*self)
        }
    }

    fn list_over(store: impl KeyValueStore + 'static, limit: usize) -> CachedOrderedList {
        CachedOrderedList::new(Arc::new(store), CacheConfig::new(limit, 60))
    }

    async fn rows(values: Vec<u32>) -> Result<Vec<u32>, Infallible> {
        Ok(values)
    }

    #[tokio::test]
    async fn test_miss_populates_and_hit_skips_loader() {
        let list = list_over(MemoryStore::new(), 10);
        let calls = AtomicUsize::new(0);

        let first = list
            .get("v1:feed:user:a", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                rows(vec![3, 2, 1])
            })
            .await
            .unwrap();
        let second = list
            .get("v1:feed:user:a", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                rows(vec![])
            })
            .await
            .unwrap();

        assert_eq!(first, vec![3, 2, 1]);
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_cached() {
        let store = MemoryStore::new();
        let list = list_over(store.clone(), 10);

        let records: Vec<u32> = list.get("k", |_| rows(vec![])).await.unwrap();
        assert!(records.is_empty());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_loader_receives_list_cap() {
        let list = list_over(MemoryStore::new(), 7);
        let mut seen = 0;
        let _: Vec<u32> = list
            .get("k", |limit| {
                seen = limit;
                rows(vec![1])
            })
            .await
            .unwrap();
        assert_eq!(seen, 7);
    }

    #[tokio::test]
    async fn test_push_on_missing_key_populates_from_loader() {
        let store = MemoryStore::new();
        let list = list_over(store.clone(), 10);

        list.push("k", &4u32, |_| rows(vec![4, 3])).await.unwrap();

        let cached: Vec<u32> = list.get("k", |_| rows(vec![])).await.unwrap();
        assert_eq!(cached, vec![4, 3]);
    }

    #[tokio::test]
    async fn test_push_trims_to_cap() {
        let list = list_over(MemoryStore::new(), 3);
        let _: Vec<u32> = list.get("k", |_| rows(vec![3, 2, 1])).await.unwrap();

        list.push("k", &4u32, |_| rows(vec![])).await.unwrap();

        let cached: Vec<u32> = list.get("k", |_| rows(vec![])).await.unwrap();
        assert_eq!(cached, vec![4, 3, 2]);
    }

    #[tokio::test]
    async fn test_out_of_order_push_keeps_list_sorted() {
        let list = list_over(MemoryStore::new(), 10);
        let _: Vec<u32> = list.get("k", |_| rows(vec![1])).await.unwrap();

        list.push("k", &3u32, |_| rows(vec![3, 1])).await.unwrap();
        // 2 committed before 3 but its push arrives last
        let calls = AtomicUsize::new(0);
        list.push("k", &2u32, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            rows(vec![3, 2, 1])
        })
        .await
        .unwrap();

        let cached: Vec<u32> = list.get("k", |_| rows(vec![])).await.unwrap();
        assert_eq!(cached, vec![3, 2, 1]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_push_of_current_head_does_not_duplicate() {
        let list = list_over(MemoryStore::new(), 10);
        let _: Vec<u32> = list.get("k", |_| rows(vec![5, 4])).await.unwrap();

        list.push("k", &5u32, |_| rows(vec![5, 4])).await.unwrap();

        let cached: Vec<u32> = list.get("k", |_| rows(vec![])).await.unwrap();
        assert_eq!(cached, vec![5, 4]);
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_dropped_and_reloaded() {
        let store = MemoryStore::new();
        store
            .list_replace("k", &["{broken".to_string()], 60)
            .await
            .unwrap();
        let list = list_over(store.clone(), 10);

        let records: Vec<u32> = list.get("k", |_| rows(vec![9, 8])).await.unwrap();
        assert_eq!(records, vec![9, 8]);

        let raw = store.list_range("k", 0, -1).await.unwrap();
        assert_eq!(raw, vec!["9|9".to_string(), "8|8".to_string()]);
    }

    #[tokio::test]
    async fn test_unavailable_cache_serves_loader_without_populating() {
        let mut mock = MockKeyValueStore::new();
        mock.expect_list_range()
            .returning(|_, _, _| Err(CacheError::Unavailable("connection refused".into())));
        mock.expect_list_replace().never();
        let list = list_over(mock, 10);

        let records: Vec<u32> = list.get("k", |_| rows(vec![1])).await.unwrap();
        assert_eq!(records, vec![1]);
    }

    #[tokio::test]
    async fn test_push_failure_is_not_fatal() {
        let mut mock = MockKeyValueStore::new();
        mock.expect_list_push_front_newer()
            .returning(|_, _, _, _| Err(CacheError::Timeout("200ms".into())));
        let list = list_over(mock, 10);
        let calls = AtomicUsize::new(0);

        let result = list
            .push("k", &1u32, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                rows(vec![1])
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_loader_error_propagates() {
        let list = list_over(MemoryStore::new(), 10);
        let result: Result<Vec<u32>, &str> = list.get("k", |_| async { Err::<Vec<u32>, _>("db down") }).await;
        assert_eq!(result, Err("db down"));
    }
}
