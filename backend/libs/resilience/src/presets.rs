/// Preset configurations for the stores behind the timeline
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for one dependency
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    /// Retry policy for establishing connections; operations themselves are never retried
    pub connect_retry: Option<RetryConfig>,
}

impl ServiceConfig {
    /// Override the per-call deadline, keeping the retry policy
    pub fn with_timeout_ms(mut self, millis: u64) -> Self {
        self.timeout.duration = Duration::from_millis(millis);
        self
    }
}

/// Key/value cache (Redis)
///
/// - Timeout: 200ms, a slow cache is treated like a missing one
/// - Connect retry: 3 attempts
pub fn cache_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_millis(200),
        },
        connect_retry: Some(RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }),
    }
}

/// Ordered wide-column store
///
/// - Timeout: 1s
/// - Connect retry: 3 attempts
pub fn column_store_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(1),
        },
        connect_retry: Some(RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }),
    }
}

/// Relational store (PostgreSQL)
///
/// - Timeout: 3s
/// - Connect retry: 5 attempts (startup ordering in compose/k8s)
pub fn database_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(3),
        },
        connect_retry: Some(RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_is_tighter_than_database() {
        assert!(cache_config().timeout.duration < database_config().timeout.duration);
        assert!(column_store_config().timeout.duration < database_config().timeout.duration);
    }

    #[test]
    fn test_with_timeout_ms_override() {
        let config = cache_config().with_timeout_ms(50);
        assert_eq!(config.timeout.duration, Duration::from_millis(50));
        assert!(config.connect_retry.is_some());
    }
}
