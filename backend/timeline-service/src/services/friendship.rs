use crate::domain::edge::FollowEdge;
use crate::error::{TimelineResult, ValidationError};
use crate::pagination::{Cursor, CursorParams, Page, Paginator};
use crate::repository::{GraphBackendSwitch, UserDirectory};
use std::collections::HashSet;
use std::sync::Arc;
use timeline_cache::{codec, CacheConfig, CacheKey, KeyValueStore};
use tracing::{debug, warn};
use uuid::Uuid;

/// Request-facing follow operations: validation, the backend switch, and
/// the cached set of ids a user follows.
#[derive(Clone)]
pub struct FriendshipService {
    graph: GraphBackendSwitch,
    users: Arc<dyn UserDirectory>,
    store: Arc<dyn KeyValueStore>,
    cache_config: CacheConfig,
    paginator: Paginator,
}

impl FriendshipService {
    pub fn new(
        graph: GraphBackendSwitch,
        users: Arc<dyn UserDirectory>,
        store: Arc<dyn KeyValueStore>,
        cache_config: CacheConfig,
        paginator: Paginator,
    ) -> Self {
        Self {
            graph,
            users,
            store,
            cache_config,
            paginator,
        }
    }

    pub async fn follow(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<FollowEdge> {
        if from_user_id == to_user_id {
            return Err(ValidationError::SelfFollow.into());
        }
        if !self.users.user_exists(to_user_id).await? {
            return Err(ValidationError::UserNotFound(to_user_id).into());
        }

        let edge = self
            .graph
            .follow(from_user_id, to_user_id)
            .await?
            .ok_or(ValidationError::SelfFollow)?;
        self.invalidate_following_ids(from_user_id).await;
        Ok(edge)
    }

    /// Returns how many edges were removed (0 when not following)
    pub async fn unfollow(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<u64> {
        if from_user_id == to_user_id {
            return Err(ValidationError::SelfUnfollow.into());
        }
        if !self.users.user_exists(to_user_id).await? {
            return Err(ValidationError::UserNotFound(to_user_id).into());
        }

        let deleted = self.graph.unfollow(from_user_id, to_user_id).await?;
        self.invalidate_following_ids(from_user_id).await;
        Ok(deleted)
    }

    pub async fn has_followed(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<bool> {
        self.graph.has_followed(from_user_id, to_user_id).await
    }

    pub async fn following_count(&self, user_id: Uuid) -> TimelineResult<i64> {
        self.graph.following_count(user_id).await
    }

    pub async fn followers_page(&self, user_id: Uuid, params: &CursorParams) -> TimelineResult<Page<FollowEdge>> {
        let cursor = Cursor::parse(params)?;
        self.paginator
            .with_requested_size(params.size)
            .paginate_query(cursor, |window, limit| self.graph.followers(user_id, window, limit))
            .await
    }

    pub async fn followings_page(&self, user_id: Uuid, params: &CursorParams) -> TimelineResult<Page<FollowEdge>> {
        let cursor = Cursor::parse(params)?;
        self.paginator
            .with_requested_size(params.size)
            .paginate_query(cursor, |window, limit| self.graph.followings(user_id, window, limit))
            .await
    }

    /// Ids `user_id` follows, cached as one JSON value until the next
    /// follow or unfollow by that user
    pub async fn following_user_ids(&self, user_id: Uuid) -> TimelineResult<HashSet<Uuid>> {
        let key = CacheKey::following_ids(user_id);
        match self.store.get(&key).await {
            Ok(Some(raw)) => match codec::decode::<Vec<Uuid>>(&raw) {
                Ok(ids) => return Ok(ids.into_iter().collect()),
                Err(e) => warn!(key = %key, error = %e, "Dropping undecodable following ids"),
            },
            Ok(None) => debug!(key = %key, "Following ids not cached"),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache unavailable, reading following ids from graph");
                return Ok(self.graph.following_ids(user_id).await?.into_iter().collect());
            }
        }

        let ids = self.graph.following_ids(user_id).await?;
        match codec::encode(&ids) {
            Ok(raw) => {
                if let Err(e) = self
                    .store
                    .set_ex(&key, &raw, self.cache_config.key_ttl_secs)
                    .await
                {
                    warn!(key = %key, error = %e, "Failed to cache following ids");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "Failed to encode following ids"),
        }
        Ok(ids.into_iter().collect())
    }

    pub async fn invalidate_following_ids(&self, user_id: Uuid) {
        let key = CacheKey::following_ids(user_id);
        if let Err(e) = self.store.del(&key).await {
            warn!(key = %key, error = %e, "Failed to invalidate following ids");
        }
    }
}
