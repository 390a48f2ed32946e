//! Integer counters cached in front of an authoritative column
//!
//! The durable store owns the value. The cache only ever holds a copy that is
//! adjusted in place while it exists; once it has expired the next access
//! copies the durable value back instead of doing arithmetic on nothing.

use crate::{CacheConfig, CacheError, CacheKey, CacheMetrics, CounterRef, KeyValueStore};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct CachedCounter {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
    metrics: CacheMetrics,
}

impl CachedCounter {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            metrics: CacheMetrics::new(),
        }
    }

    /// Add one to the cached copy. The durable +1 must already be applied.
    pub async fn increment<E, F, Fut>(&self, counter: &CounterRef, load: F) -> Result<i64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, E>>,
    {
        self.adjust(counter, 1, load).await
    }

    /// Subtract one from the cached copy. The durable -1 must already be applied.
    pub async fn decrement<E, F, Fut>(&self, counter: &CounterRef, load: F) -> Result<i64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, E>>,
    {
        self.adjust(counter, -1, load).await
    }

    pub async fn read<E, F, Fut>(&self, counter: &CounterRef, load: F) -> Result<i64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, E>>,
    {
        let key = CacheKey::counter(counter);
        match self.store.get(&key).await {
            Ok(Some(raw)) => match raw.parse::<i64>() {
                Ok(value) => {
                    self.metrics.record_hit(&key);
                    Ok(value)
                }
                Err(_) => {
                    warn!(key = %key, "Cached counter is not an integer, reloading");
                    self.metrics.record_error(&key, "invalid_data");
                    self.backfill(&key, load).await
                }
            },
            Ok(None) => {
                self.metrics.record_miss(&key);
                self.backfill(&key, load).await
            }
            Err(e) => {
                self.degraded(&key, &e);
                load().await
            }
        }
    }

    /// Drop the cached copy
    pub async fn invalidate(&self, counter: &CounterRef) {
        let key = CacheKey::counter(counter);
        if let Err(e) = self.store.del(&key).await {
            self.degraded(&key, &e);
        }
    }

    async fn adjust<E, F, Fut>(&self, counter: &CounterRef, delta: i64, load: F) -> Result<i64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, E>>,
    {
        let key = CacheKey::counter(counter);
        match self.store.incr_existing(&key, delta).await {
            Ok(Some(value)) => {
                self.metrics.record_write(&key);
                Ok(value)
            }
            Ok(None) => {
                debug!(key = %key, "Counter not cached, backfilling");
                self.metrics.record_miss(&key);
                self.backfill(&key, load).await
            }
            Err(e) => {
                self.degraded(&key, &e);
                load().await
            }
        }
    }

    /// The loaded value already includes the caller's change; store it as is
    async fn backfill<E, F, Fut>(&self, key: &str, load: F) -> Result<i64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, E>>,
    {
        let value = load().await?;
        match self
            .store
            .set_ex(key, &value.to_string(), self.config.key_ttl_secs)
            .await
        {
            Ok(()) => self.metrics.record_write(key),
            Err(e) => self.degraded(key, &e),
        }
        Ok(value)
    }

    fn degraded(&self, key: &str, error: &CacheError) {
        warn!(key = %key, error = %error, "Counter cache unavailable, using durable value");
        self.metrics.record_error(key, error.kind());
        self.metrics.record_fallback(key);
    }
}
