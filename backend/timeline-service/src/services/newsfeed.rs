//! Fan-out on write
//!
//! Publishing resolves the author's audience with one bulk follower query,
//! writes every feed entry in one statement, then pushes each entry into its
//! viewer's cached feed. The durable write decides success; cache pushes
//! only warm the cache and may fail independently.

use crate::clock;
use crate::domain::feed::FeedEntry;
use crate::domain::post::Post;
use crate::error::{TimelineError, TimelineResult};
use crate::pagination::{Cursor, CursorParams, Page, Paginator, TimeWindow};
use crate::repository::{FeedRepository, GraphBackendSwitch};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use timeline_cache::{CacheKey, CachedOrderedList};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct NewsFeedService {
    feeds: Arc<dyn FeedRepository>,
    graph: GraphBackendSwitch,
    cache: CachedOrderedList,
    paginator: Paginator,
    push_concurrency: usize,
}

impl NewsFeedService {
    pub fn new(
        feeds: Arc<dyn FeedRepository>,
        graph: GraphBackendSwitch,
        cache: CachedOrderedList,
        paginator: Paginator,
        push_concurrency: usize,
    ) -> Self {
        Self {
            feeds,
            graph,
            cache,
            paginator,
            push_concurrency: push_concurrency.max(1),
        }
    }

    /// Deliver a persisted post to its author and every follower.
    ///
    /// Returns the inserted entries. A failed bulk insert delivers to nobody.
    pub async fn publish(&self, post: &Post) -> TimelineResult<Vec<FeedEntry>> {
        let followers = self.graph.follower_ids(post.author_id).await?;

        let mut seen = HashSet::with_capacity(followers.len() + 1);
        let audience: Vec<Uuid> = followers
            .into_iter()
            .chain(std::iter::once(post.author_id))
            .filter(|viewer| seen.insert(*viewer))
            .collect();

        let created_at = clock::now();
        let entries: Vec<FeedEntry> = audience
            .iter()
            .map(|viewer| FeedEntry::new(*viewer, post.id, created_at))
            .collect();

        self.feeds
            .insert_entries(&entries)
            .await
            .map_err(|e| match e {
                TimelineError::BulkWriteFailure(_) => e,
                other => TimelineError::BulkWriteFailure(other.to_string()),
            })?;

        stream::iter(entries.iter())
            .for_each_concurrent(self.push_concurrency, |entry| self.push_to_cache(entry))
            .await;

        info!(
            post_id = %post.id,
            author_id = %post.author_id,
            audience = entries.len(),
            "Fanned out post"
        );
        Ok(entries)
    }

    /// Write a single feed entry and push it into the viewer's cache
    pub async fn create_feed_entry(&self, viewer_id: Uuid, post_id: Uuid) -> TimelineResult<FeedEntry> {
        let entry = FeedEntry::now(viewer_id, post_id);
        self.feeds.insert_entries(std::slice::from_ref(&entry)).await?;
        self.push_to_cache(&entry).await;
        Ok(entry)
    }

    /// The viewer's newest feed entries, from cache when possible
    pub async fn get_cached_feed(&self, viewer_id: Uuid) -> TimelineResult<Vec<FeedEntry>> {
        let feeds = self.feeds.clone();
        self.cache
            .get(&CacheKey::user_feed(viewer_id), move |limit| async move {
                feeds
                    .feed_by_viewer(viewer_id, TimeWindow::Newest, Some(limit))
                    .await
            })
            .await
    }

    pub async fn list_feed(&self, viewer_id: Uuid, params: &CursorParams) -> TimelineResult<Page<FeedEntry>> {
        let cursor = Cursor::parse(params)?;
        let paginator = self.paginator.with_requested_size(params.size);
        let cached = self.get_cached_feed(viewer_id).await?;
        let feeds = self.feeds.clone();

        paginator
            .paginate_cached_or_query(
                &cached,
                cursor,
                self.cache.config().list_length_limit,
                move |window, limit| async move { feeds.feed_by_viewer(viewer_id, window, limit).await },
            )
            .await
    }

    async fn push_to_cache(&self, entry: &FeedEntry) {
        let feeds = self.feeds.clone();
        let viewer_id = entry.viewer_id;
        let result = self
            .cache
            .push(&CacheKey::user_feed(viewer_id), entry, move |limit| async move {
                feeds
                    .feed_by_viewer(viewer_id, TimeWindow::Newest, Some(limit))
                    .await
            })
            .await;

        if let Err(e) = result {
            warn!(
                viewer_id = %viewer_id,
                post_id = %entry.post_id,
                error = %e,
                "Failed to push feed entry into cache"
            );
        }
    }
}
