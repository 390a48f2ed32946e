use super::{CounterRepository, FeedRepository, PostRepository, UserDirectory};
use crate::domain::feed::FeedEntry;
use crate::domain::post::{Post, PostCounter};
use crate::error::TimelineResult;
use crate::pagination::TimeWindow;
use chrono::{DateTime, Utc};
use resilience::{with_retry, with_timeout, ServiceConfig};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Open the PostgreSQL pool, retrying while the database comes up
pub async fn connect_pool(
    database_url: &str,
    max_connections: u32,
    config: &ServiceConfig,
) -> TimelineResult<PgPool> {
    let open = || {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(config.timeout.duration)
            .test_before_acquire(true)
            .connect(database_url)
    };

    let pool = match config.connect_retry.clone() {
        Some(retry) => with_retry(retry, open).await.map_err(|e| e.into_last())?,
        None => open().await?,
    };

    info!(max_connections, "Database pool created");
    Ok(pool)
}

/// Run a query under the per-call deadline
pub(crate) async fn bounded<T, F>(timeout: Duration, query: F) -> TimelineResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    Ok(with_timeout(timeout, query).await??)
}

pub(crate) fn limit_param(limit: Option<usize>) -> Option<i64> {
    limit.map(|n| n.min(i64::MAX as usize) as i64)
}

/// PostgreSQL storage for posts, feed entries, counters and users
#[derive(Clone)]
pub struct PostgresTimelineRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresTimelineRepository {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl PostRepository for PostgresTimelineRepository {
    async fn insert_post(&self, post: &Post) -> TimelineResult<()> {
        bounded(
            self.timeout,
            sqlx::query(
                r#"
                INSERT INTO posts (id, author_id, content, likes_count, comments_count, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(post.id)
            .bind(post.author_id)
            .bind(&post.content)
            .bind(post.likes_count)
            .bind(post.comments_count)
            .bind(post.created_at)
            .execute(&self.pool),
        )
        .await?;

        debug!(post_id = %post.id, author_id = %post.author_id, "Inserted post");
        Ok(())
    }

    async fn get_post(&self, post_id: Uuid) -> TimelineResult<Option<Post>> {
        bounded(
            self.timeout,
            sqlx::query_as::<_, Post>(
                r#"
                SELECT id, author_id, content, likes_count, comments_count, created_at
                FROM posts
                WHERE id = $1
                "#,
            )
            .bind(post_id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn posts_by_author(
        &self,
        author_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<Post>> {
        let (older_than, newer_than) = window.bounds();
        bounded(
            self.timeout,
            sqlx::query_as::<_, Post>(
                r#"
                SELECT id, author_id, content, likes_count, comments_count, created_at
                FROM posts
                WHERE author_id = $1
                  AND ($2::timestamptz IS NULL OR created_at < $2)
                  AND ($3::timestamptz IS NULL OR created_at > $3)
                ORDER BY created_at DESC
                LIMIT $4
                "#,
            )
            .bind(author_id)
            .bind(older_than)
            .bind(newer_than)
            .bind(limit_param(limit))
            .fetch_all(&self.pool),
        )
        .await
    }
}

#[async_trait::async_trait]
impl FeedRepository for PostgresTimelineRepository {
    async fn insert_entries(&self, entries: &[FeedEntry]) -> TimelineResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
        let viewers: Vec<Uuid> = entries.iter().map(|e| e.viewer_id).collect();
        let posts: Vec<Uuid> = entries.iter().map(|e| e.post_id).collect();
        let created: Vec<DateTime<Utc>> = entries.iter().map(|e| e.created_at).collect();

        // One statement, so a constraint violation rejects every row
        bounded(
            self.timeout,
            sqlx::query(
                r#"
                INSERT INTO newsfeeds (id, viewer_id, post_id, created_at)
                SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::timestamptz[])
                "#,
            )
            .bind(ids)
            .bind(viewers)
            .bind(posts)
            .bind(created)
            .execute(&self.pool),
        )
        .await?;

        debug!(count = entries.len(), "Inserted feed entries");
        Ok(())
    }

    async fn feed_by_viewer(
        &self,
        viewer_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FeedEntry>> {
        let (older_than, newer_than) = window.bounds();
        bounded(
            self.timeout,
            sqlx::query_as::<_, FeedEntry>(
                r#"
                SELECT id, viewer_id, post_id, created_at
                FROM newsfeeds
                WHERE viewer_id = $1
                  AND ($2::timestamptz IS NULL OR created_at < $2)
                  AND ($3::timestamptz IS NULL OR created_at > $3)
                ORDER BY created_at DESC
                LIMIT $4
                "#,
            )
            .bind(viewer_id)
            .bind(older_than)
            .bind(newer_than)
            .bind(limit_param(limit))
            .fetch_all(&self.pool),
        )
        .await
    }
}

#[async_trait::async_trait]
impl CounterRepository for PostgresTimelineRepository {
    async fn adjust(&self, post_id: Uuid, counter: PostCounter, delta: i64) -> TimelineResult<i64> {
        // column names come from a closed enum, never from input
        let sql = format!(
            "UPDATE posts SET {col} = {col} + $2 WHERE id = $1 RETURNING {col}",
            col = counter.column()
        );
        bounded(
            self.timeout,
            sqlx::query_scalar::<_, i64>(&sql)
                .bind(post_id)
                .bind(delta)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn read(&self, post_id: Uuid, counter: PostCounter) -> TimelineResult<i64> {
        let sql = format!("SELECT {} FROM posts WHERE id = $1", counter.column());
        bounded(
            self.timeout,
            sqlx::query_scalar::<_, i64>(&sql)
                .bind(post_id)
                .fetch_one(&self.pool),
        )
        .await
    }
}

#[async_trait::async_trait]
impl UserDirectory for PostgresTimelineRepository {
    async fn user_exists(&self, user_id: Uuid) -> TimelineResult<bool> {
        bounded(
            self.timeout,
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool),
        )
        .await
    }
}
