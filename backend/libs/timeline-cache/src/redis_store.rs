use crate::store::FrontPush;
use crate::{CacheError, CacheResult, KeyValueStore};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, IntoConnectionInfo, Script};
use resilience::{with_retry, with_timeout, ServiceConfig};
use std::collections::HashMap;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

/// INCRBY only when the key is present; a missing key must be backfilled from
/// the durable store instead of starting from zero.
const INCR_EXISTING_LUA: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('INCRBY', KEYS[1], ARGV[1])
end
return false
"#;

/// LPUSH + LTRIM only when the list exists and its head entry's score is
/// lower than ARGV[2]. Returns 1 pushed, 0 missing, -1 stale.
const PUSH_FRONT_NEWER_LUA: &str = r#"
local head = redis.call('LINDEX', KEYS[1], 0)
if not head then
    return 0
end
local sep = string.find(head, '|', 1, true)
local head_score = sep and tonumber(string.sub(head, 1, sep - 1))
if not head_score or tonumber(ARGV[2]) <= head_score then
    return -1
end
redis.call('LPUSH', KEYS[1], ARGV[1])
redis.call('LTRIM', KEYS[1], 0, tonumber(ARGV[3]) - 1)
return 1
"#;

fn push_front_newer_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(PUSH_FRONT_NEWER_LUA))
}

fn incr_existing_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(INCR_EXISTING_LUA))
}

/// Redis-backed [`KeyValueStore`].
///
/// `ConnectionManager` is multiplexed and reconnects on its own, so each call
/// works on a cheap clone. Every command runs under the configured deadline.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl RedisStore {
    pub fn new(manager: ConnectionManager, op_timeout: Duration) -> Self {
        Self {
            manager,
            op_timeout,
        }
    }

    /// Open a connection manager, retrying transient connection failures
    pub async fn connect(redis_url: &str, config: ServiceConfig) -> CacheResult<Self> {
        let info = redis_url
            .into_connection_info()
            .map_err(CacheError::Redis)?;
        let client = Client::open(info).map_err(CacheError::Redis)?;

        let manager = match config.connect_retry.clone() {
            Some(retry) => with_retry(retry, || ConnectionManager::new(client.clone()))
                .await
                .map_err(|e| CacheError::Redis(e.into_last()))?,
            None => ConnectionManager::new(client).await?,
        };

        info!("Connected to Redis key/value store");
        Ok(Self::new(manager, config.timeout.duration))
    }

    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    async fn run<T, F>(&self, op: &'static str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match with_timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(CacheError::Redis),
            Err(e) => {
                debug!(op, "Redis command exceeded deadline");
                Err(CacheError::from(e))
            }
        }
    }
}

#[async_trait::async_trait]
impl KeyValueStore for RedisStore {
    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.manager.clone();
        self.run("exists", async move { conn.exists(key).await })
            .await
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> CacheResult<Vec<String>> {
        let mut conn = self.manager.clone();
        self.run("lrange", async move { conn.lrange(key, start, stop).await })
            .await
    }

    async fn list_replace(&self, key: &str, values: &[String], ttl_secs: u64) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !values.is_empty() {
            pipe.rpush(key, values.to_vec())
                .ignore()
                .expire(key, ttl_secs as i64)
                .ignore();
        }
        self.run("list_replace", async move {
            pipe.query_async::<_, ()>(&mut conn).await
        })
        .await
    }

    async fn list_push_front_newer(
        &self,
        key: &str,
        value: &str,
        score: i64,
        max_len: usize,
    ) -> CacheResult<FrontPush> {
        let mut conn = self.manager.clone();
        let mut invocation = push_front_newer_script().key(key);
        invocation.arg(value).arg(score).arg(max_len);
        let outcome: i64 = self
            .run("push_front_newer", async move {
                invocation.invoke_async(&mut conn).await
            })
            .await?;
        Ok(match outcome {
            1 => FrontPush::Pushed,
            0 => FrontPush::Missing,
            _ => FrontPush::Stale,
        })
    }

    async fn incr_existing(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let mut conn = self.manager.clone();
        let mut invocation = incr_existing_script().key(key);
        invocation.arg(delta);
        self.run("incr_existing", async move {
            invocation.invoke_async(&mut conn).await
        })
        .await
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.manager.clone();
        self.run("get", async move { conn.get(key).await }).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        self.run("set_ex", async move {
            conn.set_ex::<_, _, ()>(key, value, ttl_secs).await
        })
        .await
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        self.run("del", async move { conn.del::<_, ()>(key).await })
            .await
    }

    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, String>> {
        let mut conn = self.manager.clone();
        self.run("hgetall", async move { conn.hgetall(key).await })
            .await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        self.run("hset", async move {
            conn.hset::<_, _, _, ()>(key, field, value).await
        })
        .await
    }
}
