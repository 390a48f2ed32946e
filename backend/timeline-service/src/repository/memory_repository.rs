//! In-process repositories with the same contracts as the PostgreSQL ones

use super::{
    CounterRepository, EdgeExport, EdgeExportCursor, FeedRepository, GraphBackend, PostRepository,
    UserDirectory,
};
use crate::domain::edge::FollowEdge;
use crate::domain::feed::FeedEntry;
use crate::domain::post::{Post, PostCounter};
use crate::domain::Timestamped;
use crate::error::{TimelineError, TimelineResult, ValidationError};
use crate::pagination::TimeWindow;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Newest first, filtered by `window`, capped at `limit`
fn newest_first<T, I>(rows: I, window: TimeWindow, limit: Option<usize>) -> Vec<T>
where
    T: Timestamped + Clone,
    I: IntoIterator<Item = T>,
{
    let mut rows: Vec<T> = rows
        .into_iter()
        .filter(|row| window.contains(row.created_at()))
        .collect();
    rows.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    rows.truncate(limit.unwrap_or(usize::MAX));
    rows
}

#[derive(Default)]
struct Tables {
    posts: HashMap<Uuid, Post>,
    feeds: Vec<FeedEntry>,
    feed_pairs: HashSet<(Uuid, Uuid)>,
    users: HashSet<Uuid>,
}

#[derive(Clone, Default)]
pub struct MemoryTimelineRepository {
    tables: Arc<Mutex<Tables>>,
    feed_writes: Arc<AtomicUsize>,
}

impl MemoryTimelineRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: Uuid) {
        self.tables.lock().await.users.insert(user_id);
    }

    /// Number of `insert_entries` calls that reached the store
    pub fn feed_write_count(&self) -> usize {
        self.feed_writes.load(Ordering::SeqCst)
    }

    pub async fn feed_entry_count(&self) -> usize {
        self.tables.lock().await.feeds.len()
    }
}

#[async_trait::async_trait]
impl PostRepository for MemoryTimelineRepository {
    async fn insert_post(&self, post: &Post) -> TimelineResult<()> {
        self.tables.lock().await.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn get_post(&self, post_id: Uuid) -> TimelineResult<Option<Post>> {
        Ok(self.tables.lock().await.posts.get(&post_id).cloned())
    }

    async fn posts_by_author(
        &self,
        author_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<Post>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(
            tables
                .posts
                .values()
                .filter(|post| post.author_id == author_id)
                .cloned(),
            window,
            limit,
        ))
    }
}

#[async_trait::async_trait]
impl FeedRepository for MemoryTimelineRepository {
    async fn insert_entries(&self, entries: &[FeedEntry]) -> TimelineResult<()> {
        self.feed_writes.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().await;

        let mut batch_pairs = HashSet::new();
        for entry in entries {
            let pair = (entry.viewer_id, entry.post_id);
            if tables.feed_pairs.contains(&pair) || !batch_pairs.insert(pair) {
                return Err(TimelineError::BulkWriteFailure(format!(
                    "duplicate feed entry for viewer {} and post {}",
                    entry.viewer_id, entry.post_id
                )));
            }
        }

        tables.feed_pairs.extend(batch_pairs);
        tables.feeds.extend(entries.iter().cloned());
        Ok(())
    }

    async fn feed_by_viewer(
        &self,
        viewer_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FeedEntry>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(
            tables
                .feeds
                .iter()
                .filter(|entry| entry.viewer_id == viewer_id)
                .cloned(),
            window,
            limit,
        ))
    }
}

#[async_trait::async_trait]
impl CounterRepository for MemoryTimelineRepository {
    async fn adjust(&self, post_id: Uuid, counter: PostCounter, delta: i64) -> TimelineResult<i64> {
        let mut tables = self.tables.lock().await;
        let post = tables
            .posts
            .get_mut(&post_id)
            .ok_or(TimelineError::Database(sqlx::Error::RowNotFound))?;
        let value = match counter {
            PostCounter::Likes => &mut post.likes_count,
            PostCounter::Comments => &mut post.comments_count,
        };
        *value += delta;
        Ok(*value)
    }

    async fn read(&self, post_id: Uuid, counter: PostCounter) -> TimelineResult<i64> {
        let tables = self.tables.lock().await;
        let post = tables
            .posts
            .get(&post_id)
            .ok_or(TimelineError::Database(sqlx::Error::RowNotFound))?;
        Ok(match counter {
            PostCounter::Likes => post.likes_count,
            PostCounter::Comments => post.comments_count,
        })
    }
}

#[async_trait::async_trait]
impl UserDirectory for MemoryTimelineRepository {
    async fn user_exists(&self, user_id: Uuid) -> TimelineResult<bool> {
        Ok(self.tables.lock().await.users.contains(&user_id))
    }
}

/// In-process relational graph: one row per edge, unique per ordered pair
#[derive(Clone, Default)]
pub struct MemoryGraphBackend {
    edges: Arc<Mutex<HashMap<(Uuid, Uuid), FollowEdge>>>,
}

impl MemoryGraphBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn edge_count(&self) -> usize {
        self.edges.lock().await.len()
    }
}

#[async_trait::async_trait]
impl GraphBackend for MemoryGraphBackend {
    fn name(&self) -> &'static str {
        "relational"
    }

    async fn insert_edge(&self, edge: &FollowEdge) -> TimelineResult<()> {
        let mut edges = self.edges.lock().await;
        let pair = (edge.from_user_id, edge.to_user_id);
        if edges.contains_key(&pair) {
            return Err(ValidationError::AlreadyFollowing.into());
        }
        edges.insert(pair, *edge);
        Ok(())
    }

    async fn delete_edge(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<u64> {
        let removed = self.edges.lock().await.remove(&(from_user_id, to_user_id));
        Ok(removed.map_or(0, |_| 1))
    }

    async fn find_edge(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<Option<FollowEdge>> {
        Ok(self.edges.lock().await.get(&(from_user_id, to_user_id)).copied())
    }

    async fn followers(
        &self,
        user_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FollowEdge>> {
        let edges = self.edges.lock().await;
        Ok(newest_first(
            edges.values().filter(|e| e.to_user_id == user_id).copied(),
            window,
            limit,
        ))
    }

    async fn followings(
        &self,
        user_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FollowEdge>> {
        let edges = self.edges.lock().await;
        Ok(newest_first(
            edges.values().filter(|e| e.from_user_id == user_id).copied(),
            window,
            limit,
        ))
    }

    async fn following_count(&self, user_id: Uuid) -> TimelineResult<i64> {
        let edges = self.edges.lock().await;
        Ok(edges.keys().filter(|(from, _)| *from == user_id).count() as i64)
    }
}

#[async_trait::async_trait]
impl EdgeExport for MemoryGraphBackend {
    async fn export_edges(
        &self,
        cursor: Option<EdgeExportCursor>,
        batch_size: usize,
    ) -> TimelineResult<Vec<FollowEdge>> {
        let edges = self.edges.lock().await;
        let mut ordered: Vec<FollowEdge> = edges
            .values()
            .filter(|e| match cursor {
                Some(after) => (e.created_at, e.from_user_id, e.to_user_id) > after,
                None => true,
            })
            .copied()
            .collect();
        ordered.sort_by_key(|e| (e.created_at, e.from_user_id, e.to_user_id));
        ordered.truncate(batch_size);
        Ok(ordered)
    }

    async fn graph_user_ids(&self) -> TimelineResult<Vec<Uuid>> {
        let edges = self.edges.lock().await;
        let users: BTreeSet<Uuid> = edges.keys().flat_map(|(from, to)| [*from, *to]).collect();
        Ok(users.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bulk_insert_is_all_or_nothing() {
        let repo = MemoryTimelineRepository::new();
        let post_id = Uuid::new_v4();
        let viewer = Uuid::new_v4();

        repo.insert_entries(&[FeedEntry::now(viewer, post_id)])
            .await
            .unwrap();

        let batch = vec![
            FeedEntry::now(Uuid::new_v4(), post_id),
            FeedEntry::now(viewer, post_id),
        ];
        let result = repo.insert_entries(&batch).await;

        assert!(matches!(result, Err(TimelineError::BulkWriteFailure(_))));
        assert_eq!(repo.feed_entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_counters_adjust_post_row() {
        let repo = MemoryTimelineRepository::new();
        let post = Post::new(Uuid::new_v4(), "hello");
        repo.insert_post(&post).await.unwrap();

        assert_eq!(repo.adjust(post.id, PostCounter::Likes, 1).await.unwrap(), 1);
        assert_eq!(repo.adjust(post.id, PostCounter::Likes, 1).await.unwrap(), 2);
        assert_eq!(repo.read(post.id, PostCounter::Comments).await.unwrap(), 0);
        assert!(repo.adjust(Uuid::new_v4(), PostCounter::Likes, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_export_walks_in_keyset_order() {
        let graph = MemoryGraphBackend::new();
        for _ in 0..5 {
            graph
                .insert_edge(&FollowEdge::new(Uuid::new_v4(), Uuid::new_v4()))
                .await
                .unwrap();
        }

        let first = graph.export_edges(None, 3).await.unwrap();
        let last = first.last().unwrap();
        let rest = graph
            .export_edges(Some((last.created_at, last.from_user_id, last.to_user_id)), 3)
            .await
            .unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(rest.len(), 2);
        assert!(rest[0].created_at > last.created_at);
    }
}
