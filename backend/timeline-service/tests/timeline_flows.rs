use std::collections::HashSet;
use std::sync::Arc;
use timeline_cache::{CacheConfig, CacheKey, CachedCounter, CachedOrderedList, KeyValueStore, MemoryStore};
use timeline_service::column_store::MemoryColumnStore;
use timeline_service::gatekeeper::StaticGate;
use timeline_service::migration::ColumnBackfill;
use timeline_service::repository::{
    ColumnGraphBackend, GraphBackendSwitch, MemoryGraphBackend, MemoryTimelineRepository,
    DEFAULT_COLUMN_STORE_FLAG,
};
use timeline_service::{
    CursorParams, EngagementService, FriendshipService, NewsFeedService, Paginator, Post,
    PostService, TimelineError, ValidationError,
};
use uuid::Uuid;

const PAGE_SIZE: usize = 3;
const LIST_CAP: usize = 5;

struct Harness {
    repo: MemoryTimelineRepository,
    relational: Arc<MemoryGraphBackend>,
    column: Arc<ColumnGraphBackend>,
    column_store: Arc<MemoryColumnStore>,
    gate: StaticGate,
    store: MemoryStore,
    switch: GraphBackendSwitch,
    posts: PostService,
    feeds: NewsFeedService,
    friends: FriendshipService,
    engagement: EngagementService,
}

impl Harness {
    fn new() -> Self {
        let repo = MemoryTimelineRepository::new();
        let relational = Arc::new(MemoryGraphBackend::new());
        let column_store = Arc::new(MemoryColumnStore::new());
        let column = Arc::new(ColumnGraphBackend::new(column_store.clone()));
        let gate = StaticGate::new();
        let store = MemoryStore::new();
        let kv: Arc<dyn KeyValueStore> = Arc::new(store.clone());
        let cache_config = CacheConfig::new(LIST_CAP, 600);
        let paginator = Paginator::new(PAGE_SIZE, PAGE_SIZE);

        let switch = GraphBackendSwitch::new(
            relational.clone(),
            column.clone(),
            Arc::new(gate.clone()),
            DEFAULT_COLUMN_STORE_FLAG,
        );
        let feeds = NewsFeedService::new(
            Arc::new(repo.clone()),
            switch.clone(),
            CachedOrderedList::new(kv.clone(), cache_config),
            paginator,
            4,
        );
        let posts = PostService::new(
            Arc::new(repo.clone()),
            CachedOrderedList::new(kv.clone(), cache_config),
            feeds.clone(),
            paginator,
        );
        let friends = FriendshipService::new(
            switch.clone(),
            Arc::new(repo.clone()),
            kv.clone(),
            cache_config,
            paginator,
        );
        let engagement = EngagementService::new(
            Arc::new(repo.clone()),
            CachedCounter::new(kv, cache_config),
        );

        Self {
            repo,
            relational,
            column,
            column_store,
            gate,
            store,
            switch,
            posts,
            feeds,
            friends,
            engagement,
        }
    }

    async fn user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.repo.add_user(id).await;
        id
    }

    /// `count` posts by `author`, returned newest first
    async fn posts_by(&self, author: Uuid, count: usize) -> Vec<Post> {
        let mut created = Vec::with_capacity(count);
        for i in 0..count {
            created.push(
                self.posts
                    .create_post(author, &format!("post {}", i))
                    .await
                    .unwrap(),
            );
        }
        created.reverse();
        created
    }
}

fn ids(posts: &[Post]) -> Vec<Uuid> {
    posts.iter().map(|p| p.id).collect()
}

#[tokio::test]
async fn test_cursor_walk_visits_every_post_once_across_cache_boundary() {
    let h = Harness::new();
    let author = h.user().await;
    let expected = h.posts_by(author, 7).await;

    let mut seen = Vec::new();
    let mut params = CursorParams::default();
    let mut pages = 0;
    loop {
        let page = h.posts.list_posts(author, &params).await.unwrap();
        pages += 1;
        assert!(page.results.len() <= PAGE_SIZE);
        seen.extend(page.results.iter().map(|p| p.id));
        if !page.has_next_page {
            break;
        }
        let oldest = page.results.last().unwrap().created_at;
        params = CursorParams::before(oldest);
    }

    assert_eq!(seen, ids(&expected));
    assert_eq!(pages, 3);
}

#[tokio::test]
async fn test_after_cursor_returns_all_newer_without_next_page() {
    let h = Harness::new();
    let author = h.user().await;
    let posts = h.posts_by(author, 7).await;

    // posts[4] is the third oldest
    let page = h
        .posts
        .list_posts(author, &CursorParams::after(posts[4].created_at))
        .await
        .unwrap();

    assert_eq!(ids(&page.results), ids(&posts[..4]));
    assert!(!page.has_next_page);
}

#[tokio::test]
async fn test_after_newest_is_empty_until_new_posts_arrive() {
    let h = Harness::new();
    let author = h.user().await;
    let posts = h.posts_by(author, 4).await;
    let params = CursorParams::after(posts[0].created_at);

    let page = h.posts.list_posts(author, &params).await.unwrap();
    assert!(page.results.is_empty());
    assert!(!page.has_next_page);

    let newer = h.posts_by(author, 3).await;
    let page = h.posts.list_posts(author, &params).await.unwrap();

    assert_eq!(ids(&page.results), ids(&newer));
    let contents: Vec<&str> = page.results.iter().map(|p| p.content.as_str()).collect();
    assert_eq!(contents, vec!["post 2", "post 1", "post 0"]);
    assert!(!page.has_next_page);
}

#[tokio::test]
async fn test_invalid_cursor_is_a_validation_error() {
    let h = Harness::new();
    let author = h.user().await;
    let params = CursorParams {
        before: Some("yesterday".to_string()),
        ..Default::default()
    };

    let err = h.posts.list_posts(author, &params).await.unwrap_err();
    assert!(matches!(
        err,
        TimelineError::Validation(ValidationError::InvalidCursor(_))
    ));
}

#[tokio::test]
async fn test_fanout_reaches_followers_and_author_in_one_write() {
    let h = Harness::new();
    let author = h.user().await;
    let mut followers = Vec::new();
    for _ in 0..3 {
        let follower = h.user().await;
        h.friends.follow(follower, author).await.unwrap();
        followers.push(follower);
    }

    let first = h.posts.create_post(author, "hello").await.unwrap();
    assert_eq!(h.repo.feed_write_count(), 1);
    assert_eq!(h.repo.feed_entry_count().await, 4);

    let second = h.posts.create_post(author, "again").await.unwrap();
    assert_eq!(h.repo.feed_write_count(), 2);

    for viewer in followers.iter().chain(std::iter::once(&author)) {
        let key = CacheKey::user_feed(*viewer);
        assert!(h.store.exists(&key).await.unwrap());
        let feed = h.feeds.get_cached_feed(*viewer).await.unwrap();
        let post_ids: Vec<Uuid> = feed.iter().map(|e| e.post_id).collect();
        assert_eq!(post_ids, vec![second.id, first.id]);
    }
}

#[tokio::test]
async fn test_republish_fails_whole_batch() {
    let h = Harness::new();
    let author = h.user().await;
    let follower = h.user().await;
    h.friends.follow(follower, author).await.unwrap();
    let post = h.posts.create_post(author, "once").await.unwrap();

    let err = h.feeds.publish(&post).await.unwrap_err();

    assert!(matches!(err, TimelineError::BulkWriteFailure(_)));
    assert_eq!(h.repo.feed_entry_count().await, 2);
}

#[tokio::test]
async fn test_single_feed_entry_goes_to_front_of_cached_feed() {
    let h = Harness::new();
    let author = h.user().await;
    let viewer = h.user().await;
    h.friends.follow(viewer, author).await.unwrap();
    h.posts.create_post(author, "followed").await.unwrap();

    let other = h.user().await;
    let shared = h.posts.create_post(other, "shared").await.unwrap();
    h.feeds.create_feed_entry(viewer, shared.id).await.unwrap();

    let feed = h.feeds.get_cached_feed(viewer).await.unwrap();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].post_id, shared.id);
}

#[tokio::test]
async fn test_feed_pages_match_durable_order() {
    let h = Harness::new();
    let author = h.user().await;
    let viewer = h.user().await;
    h.friends.follow(viewer, author).await.unwrap();
    let posts = h.posts_by(author, 7).await;

    let first = h.feeds.list_feed(viewer, &CursorParams::default()).await.unwrap();
    assert!(first.has_next_page);
    let oldest = first.results.last().unwrap().created_at;
    let second = h
        .feeds
        .list_feed(viewer, &CursorParams::before(oldest))
        .await
        .unwrap();

    let walked: Vec<Uuid> = first
        .results
        .iter()
        .chain(second.results.iter())
        .map(|e| e.post_id)
        .collect();
    assert_eq!(walked, ids(&posts[..6]));
}

#[tokio::test]
async fn test_self_relations() {
    let h = Harness::new();
    let user = h.user().await;

    let follow = h.friends.follow(user, user).await.unwrap_err();
    assert!(matches!(follow, TimelineError::Validation(ValidationError::SelfFollow)));
    let unfollow = h.friends.unfollow(user, user).await.unwrap_err();
    assert!(matches!(unfollow, TimelineError::Validation(ValidationError::SelfUnfollow)));

    assert!(h.switch.follow(user, user).await.unwrap().is_none());
    assert_eq!(h.switch.unfollow(user, user).await.unwrap(), 0);
    assert!(h.friends.has_followed(user, user).await.unwrap());
    assert_eq!(h.relational.edge_count().await, 0);
}

#[tokio::test]
async fn test_follow_validation() {
    let h = Harness::new();
    let (a, b) = (h.user().await, h.user().await);

    let missing = Uuid::new_v4();
    let err = h.friends.follow(a, missing).await.unwrap_err();
    assert!(matches!(err, TimelineError::Validation(ValidationError::UserNotFound(id)) if id == missing));

    h.friends.follow(a, b).await.unwrap();
    let err = h.friends.follow(a, b).await.unwrap_err();
    assert!(matches!(err, TimelineError::Validation(ValidationError::AlreadyFollowing)));

    assert_eq!(h.friends.unfollow(a, b).await.unwrap(), 1);
    assert_eq!(h.friends.unfollow(a, b).await.unwrap(), 0);
}

#[tokio::test]
async fn test_backends_answer_identically() {
    let relational = Harness::new();
    let column = Harness::new();
    column.gate.turn_on(DEFAULT_COLUMN_STORE_FLAG);

    let users: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    let pairs = [(0, 1), (0, 2), (0, 3), (1, 0), (2, 0), (3, 1)];
    for h in [&relational, &column] {
        for user in &users {
            h.repo.add_user(*user).await;
        }
        for (from, to) in pairs {
            h.friends.follow(users[from], users[to]).await.unwrap();
        }
        h.friends.unfollow(users[0], users[2]).await.unwrap();
    }
    assert_eq!(column.relational.edge_count().await, 0);

    for user in &users {
        let r_following = relational.switch.following_ids(*user).await.unwrap();
        let c_following = column.switch.following_ids(*user).await.unwrap();
        assert_eq!(r_following, c_following);

        let r_followers = relational.switch.follower_ids(*user).await.unwrap();
        let c_followers = column.switch.follower_ids(*user).await.unwrap();
        assert_eq!(r_followers, c_followers);

        assert_eq!(
            relational.friends.following_count(*user).await.unwrap(),
            column.friends.following_count(*user).await.unwrap()
        );
        for other in &users {
            assert_eq!(
                relational.friends.has_followed(*user, *other).await.unwrap(),
                column.friends.has_followed(*user, *other).await.unwrap()
            );
        }
    }

    let page = column
        .friends
        .followings_page(users[0], &CursorParams::default())
        .await
        .unwrap();
    let to: Vec<Uuid> = page.results.iter().map(|e| e.to_user_id).collect();
    assert_eq!(to, vec![users[3], users[1]]);
    assert!(!page.has_next_page);
}

#[tokio::test]
async fn test_gate_switch_after_backfill() {
    let h = Harness::new();
    let (a, b) = (h.user().await, h.user().await);
    h.friends.follow(a, b).await.unwrap();

    h.gate.turn_on(DEFAULT_COLUMN_STORE_FLAG);
    assert!(!h.friends.has_followed(a, b).await.unwrap());

    ColumnBackfill::new(h.relational.clone(), h.column.clone())
        .run()
        .await
        .unwrap();
    assert!(h.friends.has_followed(a, b).await.unwrap());

    h.column_store.set_available(false);
    let err = h.friends.has_followed(a, b).await.unwrap_err();
    assert!(matches!(err, TimelineError::ColumnStore(_)));

    h.gate.turn_off(DEFAULT_COLUMN_STORE_FLAG);
    assert!(h.friends.has_followed(a, b).await.unwrap());
}

#[tokio::test]
async fn test_following_ids_cache_is_invalidated_on_follow() {
    let h = Harness::new();
    let (a, b, c) = (h.user().await, h.user().await, h.user().await);
    h.friends.follow(a, b).await.unwrap();

    let first = h.friends.following_user_ids(a).await.unwrap();
    assert_eq!(first, HashSet::from([b]));
    assert!(h.store.exists(&CacheKey::following_ids(a)).await.unwrap());

    h.friends.follow(a, c).await.unwrap();
    assert!(!h.store.exists(&CacheKey::following_ids(a)).await.unwrap());
    let second = h.friends.following_user_ids(a).await.unwrap();
    assert_eq!(second, HashSet::from([b, c]));
}

#[tokio::test]
async fn test_engagement_counters_backfill_from_post_row() {
    let h = Harness::new();
    let author = h.user().await;
    let post = h.posts.create_post(author, "likeable").await.unwrap();

    assert_eq!(h.engagement.like_added(post.id).await.unwrap(), 1);
    assert_eq!(h.engagement.like_added(post.id).await.unwrap(), 2);
    assert_eq!(h.engagement.comment_added(post.id).await.unwrap(), 1);

    h.store.clear().await;
    assert_eq!(h.engagement.likes_count(post.id).await.unwrap(), 2);
    assert_eq!(h.engagement.like_removed(post.id).await.unwrap(), 1);
    assert_eq!(h.engagement.comment_removed(post.id).await.unwrap(), 0);
    assert_eq!(h.engagement.comments_count(post.id).await.unwrap(), 0);

    let stored = h.posts.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(stored.likes_count, 1);
    assert_eq!(stored.comments_count, 0);
}
