/// Resilience helpers for the timeline stores
///
/// - **Timeout**: every cache, column-store and relational call runs under a bounded deadline
/// - **Retry**: exponential backoff with jitter, used only for establishing connections
/// - **Presets**: per-dependency deadlines (cache, column store, database)
///
/// # Example: cache read with a deadline
///
/// ```rust,no_run
/// use resilience::{presets, timeout::with_timeout};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::cache_config();
///     let result = with_timeout(config.timeout.duration, async { 42 }).await;
///     assert!(result.is_ok());
/// }
/// ```

pub mod presets;
pub mod retry;
pub mod timeout;

pub use presets::{cache_config, column_store_config, database_config, ServiceConfig};
pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout, TimeoutConfig, TimeoutError};
