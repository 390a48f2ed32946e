use crate::domain::edge::FollowEdge;
use crate::domain::feed::FeedEntry;
use crate::domain::post::{Post, PostCounter};
use crate::error::TimelineResult;
use crate::pagination::TimeWindow;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One representation of the social graph. The relational and the column
/// store backends both implement it and must answer identically.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GraphBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Store an edge with its own timestamp.
    /// A duplicate pair fails with `ValidationError::AlreadyFollowing`.
    async fn insert_edge(&self, edge: &FollowEdge) -> TimelineResult<()>;

    /// Remove the edge; returns how many edges were deleted (0 or 1)
    async fn delete_edge(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<u64>;

    async fn find_edge(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<Option<FollowEdge>>;

    async fn edge_exists(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<bool> {
        Ok(self.find_edge(from_user_id, to_user_id).await?.is_some())
    }

    /// Edges pointing at `user_id`, newest first
    async fn followers(
        &self,
        user_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FollowEdge>>;

    /// Edges leaving `user_id`, newest first
    async fn followings(
        &self,
        user_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FollowEdge>>;

    async fn following_count(&self, user_id: Uuid) -> TimelineResult<i64>;

    /// Every follower id in one round trip, newest first
    async fn follower_ids(&self, user_id: Uuid) -> TimelineResult<Vec<Uuid>> {
        Ok(self
            .followers(user_id, TimeWindow::Newest, None)
            .await?
            .into_iter()
            .map(|edge| edge.from_user_id)
            .collect())
    }

    async fn following_ids(&self, user_id: Uuid) -> TimelineResult<Vec<Uuid>> {
        Ok(self
            .followings(user_id, TimeWindow::Newest, None)
            .await?
            .into_iter()
            .map(|edge| edge.to_user_id)
            .collect())
    }
}

/// Position after the last exported edge, in (created_at, from, to) order
pub type EdgeExportCursor = (DateTime<Utc>, Uuid, Uuid);

/// Full, ordered export of the relational edge table
#[async_trait::async_trait]
pub trait EdgeExport: Send + Sync {
    /// Up to `batch_size` edges strictly after `cursor`, oldest first
    async fn export_edges(
        &self,
        cursor: Option<EdgeExportCursor>,
        batch_size: usize,
    ) -> TimelineResult<Vec<FollowEdge>>;

    /// Users that appear on either side of any edge
    async fn graph_user_ids(&self) -> TimelineResult<Vec<Uuid>>;
}

#[async_trait::async_trait]
pub trait PostRepository: Send + Sync {
    async fn insert_post(&self, post: &Post) -> TimelineResult<()>;

    async fn get_post(&self, post_id: Uuid) -> TimelineResult<Option<Post>>;

    /// Posts by `author_id`, newest first
    async fn posts_by_author(
        &self,
        author_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<Post>>;
}

#[async_trait::async_trait]
pub trait FeedRepository: Send + Sync {
    /// Insert every entry in a single all-or-nothing write
    async fn insert_entries(&self, entries: &[FeedEntry]) -> TimelineResult<()>;

    /// Feed entries of `viewer_id`, newest first
    async fn feed_by_viewer(
        &self,
        viewer_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FeedEntry>>;
}

/// Authoritative counters denormalized on the post row
#[async_trait::async_trait]
pub trait CounterRepository: Send + Sync {
    /// Atomically add `delta` and return the new value
    async fn adjust(&self, post_id: Uuid, counter: PostCounter, delta: i64) -> TimelineResult<i64>;

    async fn read(&self, post_id: Uuid, counter: PostCounter) -> TimelineResult<i64>;
}

#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, user_id: Uuid) -> TimelineResult<bool>;
}
