//! Cache error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache operation timed out: {0}")]
    Timeout(String),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid cache data: {0}")]
    InvalidData(String),
}

impl From<resilience::TimeoutError> for CacheError {
    fn from(err: resilience::TimeoutError) -> Self {
        CacheError::Timeout(err.to_string())
    }
}

impl CacheError {
    /// Short label used for the `error_type` metric dimension
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::Redis(_) => "redis",
            CacheError::Serialization(_) => "serialization",
            CacheError::Timeout(_) => "timeout",
            CacheError::Unavailable(_) => "unavailable",
            CacheError::InvalidData(_) => "invalid_data",
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
