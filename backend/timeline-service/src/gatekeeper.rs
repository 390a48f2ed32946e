//! Percentage feature gates
//!
//! A flag holds a rollout percentage. `is_enabled` is the global switch and
//! is on only at 100; `is_enabled_for` admits a stable slice of subjects.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use timeline_cache::{CacheKey, CacheResult, KeyValueStore};
use tracing::warn;
use uuid::Uuid;

const PERCENT_FIELD: &str = "percent";

#[async_trait::async_trait]
pub trait FeatureGate: Send + Sync {
    async fn is_enabled(&self, flag: &str) -> bool;

    async fn is_enabled_for(&self, flag: &str, subject: Uuid) -> bool;
}

/// Same subject, same answer, for a given percentage
fn admits(percent: u8, subject: Uuid) -> bool {
    subject.as_u128() % 100 < u128::from(percent)
}

/// Gate with percentages held in process, set from configuration or tests
#[derive(Clone, Default)]
pub struct StaticGate {
    percents: Arc<RwLock<HashMap<String, u8>>>,
}

impl StaticGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(self, flag: &str, percent: u8) -> Self {
        self.set_percent(flag, percent);
        self
    }

    pub fn set_percent(&self, flag: &str, percent: u8) {
        let mut percents = self.percents.write().unwrap_or_else(|e| e.into_inner());
        percents.insert(flag.to_string(), percent.min(100));
    }

    pub fn turn_on(&self, flag: &str) {
        self.set_percent(flag, 100);
    }

    pub fn turn_off(&self, flag: &str) {
        self.set_percent(flag, 0);
    }

    fn percent(&self, flag: &str) -> u8 {
        let percents = self.percents.read().unwrap_or_else(|e| e.into_inner());
        percents.get(flag).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl FeatureGate for StaticGate {
    async fn is_enabled(&self, flag: &str) -> bool {
        self.percent(flag) == 100
    }

    async fn is_enabled_for(&self, flag: &str, subject: Uuid) -> bool {
        admits(self.percent(flag), subject)
    }
}

/// Gate read from the key/value store on every call: hash `v1:gk:{flag}`,
/// field `percent`. Unreadable flags count as off.
#[derive(Clone)]
pub struct RedisGatekeeper {
    store: Arc<dyn KeyValueStore>,
}

impl RedisGatekeeper {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn percent(&self, flag: &str) -> u8 {
        match self.store.hash_get_all(&CacheKey::gatekeeper(flag)).await {
            Ok(fields) => fields
                .get(PERCENT_FIELD)
                .and_then(|raw| raw.parse::<u8>().ok())
                .map_or(0, |percent| percent.min(100)),
            Err(e) => {
                warn!(flag, error = %e, "Failed to read gatekeeper flag, treating as off");
                0
            }
        }
    }

    pub async fn set_percent(&self, flag: &str, percent: u8) -> CacheResult<()> {
        self.store
            .hash_set(
                &CacheKey::gatekeeper(flag),
                PERCENT_FIELD,
                &percent.min(100).to_string(),
            )
            .await
    }

    pub async fn turn_on(&self, flag: &str) -> CacheResult<()> {
        self.set_percent(flag, 100).await
    }

    pub async fn turn_off(&self, flag: &str) -> CacheResult<()> {
        self.set_percent(flag, 0).await
    }
}

#[async_trait::async_trait]
impl FeatureGate for RedisGatekeeper {
    async fn is_enabled(&self, flag: &str) -> bool {
        self.percent(flag).await == 100
    }

    async fn is_enabled_for(&self, flag: &str, subject: Uuid) -> bool {
        admits(self.percent(flag).await, subject)
    }
}
