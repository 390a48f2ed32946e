use crate::domain::post::Post;
use crate::error::TimelineResult;
use crate::pagination::{Cursor, CursorParams, Page, Paginator, TimeWindow};
use crate::repository::PostRepository;
use crate::services::NewsFeedService;
use std::sync::Arc;
use timeline_cache::{CacheKey, CachedOrderedList};
use tracing::warn;
use uuid::Uuid;

/// Authoring and reading a user's own posts
#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostRepository>,
    cache: CachedOrderedList,
    newsfeed: NewsFeedService,
    paginator: Paginator,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        cache: CachedOrderedList,
        newsfeed: NewsFeedService,
        paginator: Paginator,
    ) -> Self {
        Self {
            posts,
            cache,
            newsfeed,
            paginator,
        }
    }

    /// Persist, cache and fan out a new post.
    ///
    /// A fan-out failure is returned to the caller, but the post stays
    /// persisted.
    pub async fn create_post(&self, author_id: Uuid, content: &str) -> TimelineResult<Post> {
        let post = Post::new(author_id, content);
        self.posts.insert_post(&post).await?;

        let posts = self.posts.clone();
        let pushed = self
            .cache
            .push(&CacheKey::user_posts(author_id), &post, move |limit| async move {
                posts
                    .posts_by_author(author_id, TimeWindow::Newest, Some(limit))
                    .await
            })
            .await;
        if let Err(e) = pushed {
            warn!(post_id = %post.id, error = %e, "Failed to push post into cache");
        }

        self.newsfeed.publish(&post).await?;
        Ok(post)
    }

    pub async fn get_post(&self, post_id: Uuid) -> TimelineResult<Option<Post>> {
        self.posts.get_post(post_id).await
    }

    /// The author's newest posts, from cache when possible
    pub async fn get_cached_posts(&self, author_id: Uuid) -> TimelineResult<Vec<Post>> {
        let posts = self.posts.clone();
        self.cache
            .get(&CacheKey::user_posts(author_id), move |limit| async move {
                posts
                    .posts_by_author(author_id, TimeWindow::Newest, Some(limit))
                    .await
            })
            .await
    }

    pub async fn list_posts(&self, author_id: Uuid, params: &CursorParams) -> TimelineResult<Page<Post>> {
        let cursor = Cursor::parse(params)?;
        let paginator = self.paginator.with_requested_size(params.size);
        let cached = self.get_cached_posts(author_id).await?;
        let posts = self.posts.clone();

        paginator
            .paginate_cached_or_query(
                &cached,
                cursor,
                self.cache.config().list_length_limit,
                move |window, limit| async move { posts.posts_by_author(author_id, window, limit).await },
            )
            .await
    }
}
