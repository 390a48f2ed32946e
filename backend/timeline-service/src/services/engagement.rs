use crate::domain::post::PostCounter;
use crate::error::TimelineResult;
use crate::repository::CounterRepository;
use std::sync::Arc;
use timeline_cache::{CachedCounter, CounterRef};
use uuid::Uuid;

fn post_counter(post_id: Uuid, counter: PostCounter) -> CounterRef {
    CounterRef::new("post", post_id, counter.column())
}

/// Likes and comments counters: the post row is updated first, then the
/// cached copy follows
#[derive(Clone)]
pub struct EngagementService {
    counters: Arc<dyn CounterRepository>,
    cache: CachedCounter,
}

impl EngagementService {
    pub fn new(counters: Arc<dyn CounterRepository>, cache: CachedCounter) -> Self {
        Self { counters, cache }
    }

    pub async fn like_added(&self, post_id: Uuid) -> TimelineResult<i64> {
        self.adjust(post_id, PostCounter::Likes, 1).await
    }

    pub async fn like_removed(&self, post_id: Uuid) -> TimelineResult<i64> {
        self.adjust(post_id, PostCounter::Likes, -1).await
    }

    pub async fn comment_added(&self, post_id: Uuid) -> TimelineResult<i64> {
        self.adjust(post_id, PostCounter::Comments, 1).await
    }

    pub async fn comment_removed(&self, post_id: Uuid) -> TimelineResult<i64> {
        self.adjust(post_id, PostCounter::Comments, -1).await
    }

    pub async fn likes_count(&self, post_id: Uuid) -> TimelineResult<i64> {
        self.count(post_id, PostCounter::Likes).await
    }

    pub async fn comments_count(&self, post_id: Uuid) -> TimelineResult<i64> {
        self.count(post_id, PostCounter::Comments).await
    }

    async fn adjust(&self, post_id: Uuid, counter: PostCounter, delta: i64) -> TimelineResult<i64> {
        self.counters.adjust(post_id, counter, delta).await?;

        let counters = self.counters.clone();
        let load = move || async move { counters.read(post_id, counter).await };
        let cached = post_counter(post_id, counter);
        if delta > 0 {
            self.cache.increment(&cached, load).await
        } else {
            self.cache.decrement(&cached, load).await
        }
    }

    async fn count(&self, post_id: Uuid, counter: PostCounter) -> TimelineResult<i64> {
        let counters = self.counters.clone();
        self.cache
            .read(&post_counter(post_id, counter), move || async move {
                counters.read(post_id, counter).await
            })
            .await
    }
}
