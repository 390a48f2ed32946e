//! In-process [`KeyValueStore`] with Redis semantics, for tests and local runs

use crate::codec;
use crate::store::FrontPush;
use crate::{CacheError, CacheResult, KeyValueStore};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::InvalidData(format!("WRONGTYPE operation against key {}", key))
}

/// Resolve Redis-style inclusive indexes against a list length
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything, as FLUSHDB would
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Remaining time to live of a key, if it has one
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| e.live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }
}

/// Look up a live entry, evicting it first if it has expired
fn live_entry<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|e| !e.live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut entries = self.entries.lock().await;
        Ok(live_entry(&mut entries, key).is_some())
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> CacheResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(match resolve_range(list.len(), start, stop) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            }),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn list_replace(&self, key: &str, values: &[String], ttl_secs: u64) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        if !values.is_empty() {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::List(values.iter().cloned().collect()),
                    expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
                },
            );
        }
        Ok(())
    }

    async fn list_push_front_newer(
        &self,
        key: &str,
        value: &str,
        score: i64,
        max_len: usize,
    ) -> CacheResult<FrontPush> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key) {
            None => Ok(FrontPush::Missing),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => {
                let head = list.front().and_then(|head| codec::entry_score(head));
                if !head.is_some_and(|head| score > head) {
                    return Ok(FrontPush::Stale);
                }
                list.push_front(value.to_string());
                list.truncate(max_len);
                Ok(FrontPush::Pushed)
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn incr_existing(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(raw),
                ..
            }) => {
                let current: i64 = raw.parse().map_err(|_| {
                    CacheError::InvalidData(format!("value at {} is not an integer", key))
                })?;
                let next = current + delta;
                *raw = next.to_string();
                Ok(Some(next))
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(raw),
                ..
            }) => Ok(Some(raw.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, String>> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        if live_entry(&mut entries, key).is_none() {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Hash(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        match entries.get_mut(key) {
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => {
                hash.insert(field.to_string(), value.to_string());
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }
}
