use super::postgres_repository::{bounded, limit_param};
use super::{EdgeExport, EdgeExportCursor, GraphBackend};
use crate::domain::edge::FollowEdge;
use crate::error::{TimelineError, TimelineResult, ValidationError};
use crate::pagination::TimeWindow;
use sqlx::PgPool;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL social graph: one `friendships` row per edge
#[derive(Clone)]
pub struct PostgresGraphBackend {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresGraphBackend {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Health check
    pub async fn health_check(&self) -> TimelineResult<bool> {
        bounded(self.timeout, sqlx::query("SELECT 1").execute(&self.pool)).await?;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl GraphBackend for PostgresGraphBackend {
    fn name(&self) -> &'static str {
        "relational"
    }

    async fn insert_edge(&self, edge: &FollowEdge) -> TimelineResult<()> {
        let result = bounded(
            self.timeout,
            sqlx::query(
                r#"
                INSERT INTO friendships (from_user_id, to_user_id, created_at)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(edge.from_user_id)
            .bind(edge.to_user_id)
            .bind(edge.created_at)
            .execute(&self.pool),
        )
        .await;

        match result {
            Ok(_) => {
                debug!(
                    "Created friendship in PostgreSQL: {} -> {}",
                    edge.from_user_id, edge.to_user_id
                );
                Ok(())
            }
            Err(TimelineError::Database(sqlx::Error::Database(db))) if db.is_unique_violation() => {
                Err(ValidationError::AlreadyFollowing.into())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_edge(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<u64> {
        let result = bounded(
            self.timeout,
            sqlx::query("DELETE FROM friendships WHERE from_user_id = $1 AND to_user_id = $2")
                .bind(from_user_id)
                .bind(to_user_id)
                .execute(&self.pool),
        )
        .await?;

        debug!(
            "Deleted friendship in PostgreSQL: {} -> {} ({} rows)",
            from_user_id,
            to_user_id,
            result.rows_affected()
        );
        Ok(result.rows_affected())
    }

    async fn find_edge(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<Option<FollowEdge>> {
        bounded(
            self.timeout,
            sqlx::query_as::<_, FollowEdge>(
                r#"
                SELECT from_user_id, to_user_id, created_at
                FROM friendships
                WHERE from_user_id = $1 AND to_user_id = $2
                "#,
            )
            .bind(from_user_id)
            .bind(to_user_id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn followers(
        &self,
        user_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FollowEdge>> {
        let (older_than, newer_than) = window.bounds();
        bounded(
            self.timeout,
            sqlx::query_as::<_, FollowEdge>(
                r#"
                SELECT from_user_id, to_user_id, created_at
                FROM friendships
                WHERE to_user_id = $1
                  AND ($2::timestamptz IS NULL OR created_at < $2)
                  AND ($3::timestamptz IS NULL OR created_at > $3)
                ORDER BY created_at DESC
                LIMIT $4
                "#,
            )
            .bind(user_id)
            .bind(older_than)
            .bind(newer_than)
            .bind(limit_param(limit))
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn followings(
        &self,
        user_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FollowEdge>> {
        let (older_than, newer_than) = window.bounds();
        bounded(
            self.timeout,
            sqlx::query_as::<_, FollowEdge>(
                r#"
                SELECT from_user_id, to_user_id, created_at
                FROM friendships
                WHERE from_user_id = $1
                  AND ($2::timestamptz IS NULL OR created_at < $2)
                  AND ($3::timestamptz IS NULL OR created_at > $3)
                ORDER BY created_at DESC
                LIMIT $4
                "#,
            )
            .bind(user_id)
            .bind(older_than)
            .bind(newer_than)
            .bind(limit_param(limit))
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn following_count(&self, user_id: Uuid) -> TimelineResult<i64> {
        bounded(
            self.timeout,
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM friendships WHERE from_user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn follower_ids(&self, user_id: Uuid) -> TimelineResult<Vec<Uuid>> {
        bounded(
            self.timeout,
            sqlx::query_scalar::<_, Uuid>(
                "SELECT from_user_id FROM friendships WHERE to_user_id = $1 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool),
        )
        .await
    }
}

#[async_trait::async_trait]
impl EdgeExport for PostgresGraphBackend {
    async fn export_edges(
        &self,
        cursor: Option<EdgeExportCursor>,
        batch_size: usize,
    ) -> TimelineResult<Vec<FollowEdge>> {
        let (after_ts, after_from, after_to) = match cursor {
            Some((ts, from, to)) => (Some(ts), Some(from), Some(to)),
            None => (None, None, None),
        };
        bounded(
            self.timeout,
            sqlx::query_as::<_, FollowEdge>(
                r#"
                SELECT from_user_id, to_user_id, created_at
                FROM friendships
                WHERE $1::timestamptz IS NULL
                   OR (created_at, from_user_id, to_user_id) > ($1, $2::uuid, $3::uuid)
                ORDER BY created_at, from_user_id, to_user_id
                LIMIT $4
                "#,
            )
            .bind(after_ts)
            .bind(after_from)
            .bind(after_to)
            .bind(limit_param(Some(batch_size)))
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn graph_user_ids(&self) -> TimelineResult<Vec<Uuid>> {
        bounded(
            self.timeout,
            sqlx::query_scalar::<_, Uuid>(
                r#"
                SELECT from_user_id FROM friendships
                UNION
                SELECT to_user_id FROM friendships
                "#,
            )
            .fetch_all(&self.pool),
        )
        .await
    }
}
