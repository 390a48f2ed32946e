//! Social graph stored as two ordered column-store projections
//!
//! Every edge is written twice in one atomic batch:
//! - `followings`, keyed by (reversed from_user_id, created_at), column `to_user_id`
//! - `followers`, keyed by (reversed to_user_id, created_at), column `from_user_id`
//!
//! Both rows carry the same timestamp, so the two projections order a user's
//! edges identically. Listings are reverse range scans over one subject's
//! rows, bounded by the sentinel max timestamp rather than left open.

use super::GraphBackend;
use crate::column_store::{ColumnStore, Columns, KeyPart, Mutation, Row, RowKey};
use crate::domain::edge::FollowEdge;
use crate::error::{TimelineError, TimelineResult, ValidationError};
use crate::pagination::TimeWindow;
use chrono::{DateTime, Utc};
use std::ops::Bound;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

pub const FOLLOWINGS_TABLE: &str = "followings";
pub const FOLLOWERS_TABLE: &str = "followers";

const TO_USER_COLUMN: &str = "to_user_id";
const FROM_USER_COLUMN: &str = "from_user_id";

#[derive(Clone)]
pub struct ColumnGraphBackend {
    store: Arc<dyn ColumnStore>,
}

fn row_key(subject: Uuid, ts: KeyPart) -> TimelineResult<RowKey> {
    RowKey::encode(&[KeyPart::ReversedId(subject), ts])
}

/// Timestamps before the epoch cannot be encoded; nothing is stored there
fn clamped(ts: DateTime<Utc>) -> KeyPart {
    KeyPart::Timestamp(ts.max(DateTime::<Utc>::UNIX_EPOCH))
}

fn other_user(row: &Row, column: &str) -> TimelineResult<Uuid> {
    row.columns
        .get(column)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| {
            TimelineError::ColumnStore(format!("row {} has no valid {} column", row.key, column))
        })
}

impl ColumnGraphBackend {
    pub fn new(store: Arc<dyn ColumnStore>) -> Self {
        Self { store }
    }

    /// Newest-first rows of `subject` in `table` within `window`
    async fn scan_subject(
        &self,
        table: &str,
        subject: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<Row>> {
        let oldest = Bound::Included(row_key(subject, clamped(DateTime::<Utc>::UNIX_EPOCH))?);
        let newest = Bound::Included(row_key(subject, KeyPart::MaxTimestamp)?);

        let (lower, upper) = match window {
            TimeWindow::Newest => (oldest, newest),
            TimeWindow::OlderThan(ts) => (oldest, Bound::Excluded(row_key(subject, clamped(ts))?)),
            TimeWindow::NewerThan(ts) => (Bound::Excluded(row_key(subject, clamped(ts))?), newest),
        };

        self.store.scan(table, lower, upper, true, limit).await
    }

    async fn scan_edges(
        &self,
        table: &str,
        subject: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FollowEdge>> {
        self.scan_subject(table, subject, window, limit)
            .await?
            .iter()
            .map(|row| -> TimelineResult<FollowEdge> {
                let created_at = row.key.timestamp_at(1)?;
                Ok(if table == FOLLOWINGS_TABLE {
                    FollowEdge {
                        from_user_id: subject,
                        to_user_id: other_user(row, TO_USER_COLUMN)?,
                        created_at,
                    }
                } else {
                    FollowEdge {
                        from_user_id: other_user(row, FROM_USER_COLUMN)?,
                        to_user_id: subject,
                        created_at,
                    }
                })
            })
            .collect()
    }

    /// Forward-index row of the edge, found by scanning `from_user_id`'s followings
    async fn find_forward_row(
        &self,
        from_user_id: Uuid,
        to_user_id: Uuid,
    ) -> TimelineResult<Option<(RowKey, FollowEdge)>> {
        let rows = self
            .scan_subject(FOLLOWINGS_TABLE, from_user_id, TimeWindow::Newest, None)
            .await?;
        for row in rows {
            if other_user(&row, TO_USER_COLUMN)? == to_user_id {
                let edge = FollowEdge {
                    from_user_id,
                    to_user_id,
                    created_at: row.key.timestamp_at(1)?,
                };
                return Ok(Some((row.key, edge)));
            }
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl GraphBackend for ColumnGraphBackend {
    fn name(&self) -> &'static str {
        "column"
    }

    async fn insert_edge(&self, edge: &FollowEdge) -> TimelineResult<()> {
        if self
            .find_forward_row(edge.from_user_id, edge.to_user_id)
            .await?
            .is_some()
        {
            return Err(ValidationError::AlreadyFollowing.into());
        }

        let ts = KeyPart::Timestamp(edge.created_at);
        let batch = vec![
            Mutation::put(
                FOLLOWINGS_TABLE,
                row_key(edge.from_user_id, ts)?,
                Columns::from([(TO_USER_COLUMN.to_string(), edge.to_user_id.to_string())]),
            ),
            Mutation::put(
                FOLLOWERS_TABLE,
                row_key(edge.to_user_id, ts)?,
                Columns::from([(FROM_USER_COLUMN.to_string(), edge.from_user_id.to_string())]),
            ),
        ];
        self.store.mutate(batch).await?;

        debug!(
            "Created friendship in column store: {} -> {}",
            edge.from_user_id, edge.to_user_id
        );
        Ok(())
    }

    async fn delete_edge(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<u64> {
        let Some((forward_key, edge)) = self.find_forward_row(from_user_id, to_user_id).await?
        else {
            return Ok(0);
        };

        let reverse_key = row_key(to_user_id, KeyPart::Timestamp(edge.created_at))?;
        let reverse = self.store.get(FOLLOWERS_TABLE, &reverse_key).await?;
        let matches = reverse
            .as_ref()
            .and_then(|columns| columns.get(FROM_USER_COLUMN))
            .is_some_and(|raw| raw == &from_user_id.to_string());
        if !matches {
            error!(
                forward = %forward_key,
                reverse = %reverse_key,
                "Follower projection missing or mismatched for {} -> {}",
                from_user_id, to_user_id
            );
            return Err(TimelineError::DualWriteInconsistency(format!(
                "no matching {} row {} for {} -> {}",
                FOLLOWERS_TABLE, reverse_key, from_user_id, to_user_id
            )));
        }

        self.store
            .mutate(vec![
                Mutation::delete(FOLLOWINGS_TABLE, forward_key),
                Mutation::delete(FOLLOWERS_TABLE, reverse_key),
            ])
            .await?;

        debug!(
            "Deleted friendship in column store: {} -> {}",
            from_user_id, to_user_id
        );
        Ok(1)
    }

    async fn find_edge(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<Option<FollowEdge>> {
        Ok(self
            .find_forward_row(from_user_id, to_user_id)
            .await?
            .map(|(_, edge)| edge))
    }

    async fn followers(
        &self,
        user_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FollowEdge>> {
        self.scan_edges(FOLLOWERS_TABLE, user_id, window, limit).await
    }

    async fn followings(
        &self,
        user_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FollowEdge>> {
        self.scan_edges(FOLLOWINGS_TABLE, user_id, window, limit).await
    }

    async fn following_count(&self, user_id: Uuid) -> TimelineResult<i64> {
        let rows = self
            .scan_subject(FOLLOWINGS_TABLE, user_id, TimeWindow::Newest, None)
            .await?;
        Ok(rows.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_store::MemoryColumnStore;
    use chrono::{Duration, TimeZone};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(seconds)
    }

    fn backend() -> (MemoryColumnStore, ColumnGraphBackend) {
        let store = MemoryColumnStore::new();
        let backend = ColumnGraphBackend::new(Arc::new(store.clone()));
        (store, backend)
    }

    #[tokio::test]
    async fn test_insert_writes_both_projections() {
        let (store, graph) = backend();
        let edge = FollowEdge {
            from_user_id: Uuid::new_v4(),
            to_user_id: Uuid::new_v4(),
            created_at: at(0),
        };
        graph.insert_edge(&edge).await.unwrap();

        assert_eq!(store.row_count(FOLLOWINGS_TABLE).await, 1);
        assert_eq!(store.row_count(FOLLOWERS_TABLE).await, 1);
        assert_eq!(
            graph.find_edge(edge.from_user_id, edge.to_user_id).await.unwrap(),
            Some(edge)
        );
    }

    #[tokio::test]
    async fn test_window_scans_are_strict() {
        let (_, graph) = backend();
        let target = Uuid::new_v4();
        for second in 0..5 {
            graph
                .insert_edge(&FollowEdge {
                    from_user_id: Uuid::new_v4(),
                    to_user_id: target,
                    created_at: at(second),
                })
                .await
                .unwrap();
        }

        let older = graph
            .followers(target, TimeWindow::OlderThan(at(2)), None)
            .await
            .unwrap();
        let newer = graph
            .followers(target, TimeWindow::NewerThan(at(2)), None)
            .await
            .unwrap();
        let newest_two = graph
            .followers(target, TimeWindow::Newest, Some(2))
            .await
            .unwrap();

        let times = |edges: &[FollowEdge]| edges.iter().map(|e| e.created_at).collect::<Vec<_>>();
        assert_eq!(times(&older), vec![at(1), at(0)]);
        assert_eq!(times(&newer), vec![at(4), at(3)]);
        assert_eq!(times(&newest_two), vec![at(4), at(3)]);
    }

    #[tokio::test]
    async fn test_scans_do_not_leak_between_subjects() {
        let (_, graph) = backend();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        graph.insert_edge(&FollowEdge::new(a, b)).await.unwrap();
        graph.insert_edge(&FollowEdge::new(b, a)).await.unwrap();

        assert_eq!(graph.following_count(a).await.unwrap(), 1);
        assert_eq!(graph.follower_ids(a).await.unwrap(), vec![b]);
        assert_eq!(graph.following_ids(a).await.unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn test_missing_reverse_row_is_inconsistent() {
        let (store, graph) = backend();
        let edge = FollowEdge::new(Uuid::new_v4(), Uuid::new_v4());
        graph.insert_edge(&edge).await.unwrap();

        let reverse = row_key(edge.to_user_id, KeyPart::Timestamp(edge.created_at)).unwrap();
        store
            .mutate(vec![Mutation::delete(FOLLOWERS_TABLE, reverse)])
            .await
            .unwrap();

        let result = graph.delete_edge(edge.from_user_id, edge.to_user_id).await;
        assert!(matches!(result, Err(TimelineError::DualWriteInconsistency(_))));
        assert_eq!(store.row_count(FOLLOWINGS_TABLE).await, 1);
    }
}
