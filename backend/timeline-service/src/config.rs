use crate::error::{TimelineError, TimelineResult};
use crate::gatekeeper::FeatureGate;
use crate::pagination::Paginator;
use crate::repository::{GraphBackend, GraphBackendSwitch, DEFAULT_COLUMN_STORE_FLAG};
use resilience::ServiceConfig;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use timeline_cache::CacheConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub column_store: ColumnStoreConfig,
    pub cache: CacheConfig,
    pub pagination: PaginationConfig,
    pub graph: GraphConfig,
    pub fanout: FanoutConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ColumnStoreConfig {
    /// Redis-protocol endpoint holding the ordered graph tables
    pub url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationConfig {
    pub page_size: usize,
    pub max_page_size: usize,
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Gate flag that moves graph traffic to the column store
    pub column_store_flag: String,
    /// Write every edge change to both backends
    pub mirror_writes: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FanoutConfig {
    /// Feed cache pushes in flight at once during a publish
    pub push_concurrency: usize,
}

impl Config {
    pub fn from_env() -> TimelineResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; unset values fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> TimelineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let redis_url =
            lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());

        Ok(Self {
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").ok_or_else(|| {
                    TimelineError::Config("DATABASE_URL must be set".to_string())
                })?,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
                timeout_ms: parse_or(&lookup, "DATABASE_TIMEOUT_MS", 3_000)?,
            },
            column_store: ColumnStoreConfig {
                url: lookup("COLUMN_STORE_URL").unwrap_or_else(|| redis_url.clone()),
                timeout_ms: parse_or(&lookup, "COLUMN_STORE_TIMEOUT_MS", 1_000)?,
            },
            redis: RedisConfig {
                url: redis_url,
                timeout_ms: parse_or(&lookup, "CACHE_TIMEOUT_MS", 200)?,
            },
            cache: CacheConfig::new(
                parse_or(
                    &lookup,
                    "CACHE_LIST_LENGTH_LIMIT",
                    CacheConfig::DEFAULT_LIST_LENGTH_LIMIT,
                )?,
                parse_or(&lookup, "CACHE_KEY_TTL_SECS", CacheConfig::DEFAULT_KEY_TTL_SECS)?,
            ),
            pagination: PaginationConfig {
                page_size: parse_or(&lookup, "PAGE_SIZE", Paginator::DEFAULT_PAGE_SIZE)?,
                max_page_size: parse_or(&lookup, "MAX_PAGE_SIZE", Paginator::DEFAULT_MAX_PAGE_SIZE)?,
            },
            graph: GraphConfig {
                column_store_flag: lookup("GRAPH_COLUMN_STORE_FLAG")
                    .unwrap_or_else(|| DEFAULT_COLUMN_STORE_FLAG.to_string()),
                mirror_writes: parse_or(&lookup, "GRAPH_MIRROR_WRITES", false)?,
            },
            fanout: FanoutConfig {
                push_concurrency: parse_or(&lookup, "FANOUT_PUSH_CONCURRENCY", 16usize)?.max(1),
            },
        })
    }

    pub fn paginator(&self) -> Paginator {
        Paginator::new(self.pagination.page_size, self.pagination.max_page_size)
    }

    /// Backend switch keyed on the configured flag
    pub fn graph_switch(
        &self,
        relational: Arc<dyn GraphBackend>,
        column: Arc<dyn GraphBackend>,
        gate: Arc<dyn FeatureGate>,
    ) -> GraphBackendSwitch {
        GraphBackendSwitch::new(relational, column, gate, self.graph.column_store_flag.clone())
            .with_mirror_writes(self.graph.mirror_writes)
    }

    pub fn database_service(&self) -> ServiceConfig {
        resilience::database_config().with_timeout_ms(self.database.timeout_ms)
    }

    pub fn cache_service(&self) -> ServiceConfig {
        resilience::cache_config().with_timeout_ms(self.redis.timeout_ms)
    }

    pub fn column_store_service(&self) -> ServiceConfig {
        resilience::column_store_config().with_timeout_ms(self.column_store.timeout_ms)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> TimelineResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| TimelineError::Config(format!("{} has an invalid value: {}", name, raw))),
    }
}
