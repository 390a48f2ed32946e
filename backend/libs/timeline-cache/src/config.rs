/// Cache sizing and expiry shared by every cached structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of records kept in a cached list
    pub list_length_limit: usize,
    /// Expiry applied to every populated key
    pub key_ttl_secs: u64,
}

impl CacheConfig {
    pub const DEFAULT_LIST_LENGTH_LIMIT: usize = 200;
    pub const DEFAULT_KEY_TTL_SECS: u64 = 7 * 24 * 60 * 60;

    pub fn new(list_length_limit: usize, key_ttl_secs: u64) -> Self {
        Self {
            list_length_limit: list_length_limit.max(1),
            key_ttl_secs,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIST_LENGTH_LIMIT, Self::DEFAULT_KEY_TTL_SECS)
    }
}
