//! Versioned cache key schema
//!
//! Every owner-scoped structure in the key/value store is addressed through
//! these builders so that readers, writers and invalidations agree.
//! Key format: v{VERSION}:{entity}:{sub_key}:{identifier}

use uuid::Uuid;

/// Cache schema version - increment when changing key formats or record layouts
pub const CACHE_VERSION: u32 = 1;

/// Reference to a counted attribute of an entity, e.g. the likes count of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterRef {
    pub entity: &'static str,
    pub entity_id: Uuid,
    pub counter: &'static str,
}

impl CounterRef {
    pub fn new(entity: &'static str, entity_id: Uuid, counter: &'static str) -> Self {
        Self {
            entity,
            entity_id,
            counter,
        }
    }
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Posts written by a user, newest first
    /// Format: v1:posts:user:{user_id}
    pub fn user_posts(user_id: Uuid) -> String {
        format!("v{}:posts:user:{}", CACHE_VERSION, user_id)
    }

    /// Feed entries delivered to a viewer, newest first
    /// Format: v1:feed:user:{user_id}
    pub fn user_feed(user_id: Uuid) -> String {
        format!("v{}:feed:user:{}", CACHE_VERSION, user_id)
    }

    /// Set of user ids a user follows
    /// Format: v1:graph:following_ids:{user_id}
    pub fn following_ids(user_id: Uuid) -> String {
        format!("v{}:graph:following_ids:{}", CACHE_VERSION, user_id)
    }

    /// Integer counter attached to an entity
    /// Format: v1:count:{entity}:{counter}:{entity_id}
    pub fn counter(counter: &CounterRef) -> String {
        format!(
            "v{}:count:{}:{}:{}",
            CACHE_VERSION, counter.entity, counter.counter, counter.entity_id
        )
    }

    /// Gatekeeper flag hash
    /// Format: v1:gk:{flag}
    pub fn gatekeeper(flag: &str) -> String {
        format!("v{}:gk:{}", CACHE_VERSION, flag)
    }

    /// Extract entity type from key
    pub fn entity_type(key: &str) -> Option<&str> {
        // Format: v{N}:{entity}:...
        let mut parts = key.split(':');
        match (parts.next(), parts.next()) {
            (Some(version), Some(entity)) if version.starts_with('v') => Some(entity),
            _ => None,
        }
    }
}
