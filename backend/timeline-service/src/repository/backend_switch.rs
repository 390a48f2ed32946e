use super::GraphBackend;
use crate::domain::edge::FollowEdge;
use crate::error::{TimelineError, TimelineResult, ValidationError};
use crate::gatekeeper::FeatureGate;
use crate::metrics::GraphMetrics;
use crate::pagination::TimeWindow;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

pub const DEFAULT_COLUMN_STORE_FLAG: &str = "switch_friendship_to_column_store";

/// Routes every graph operation to the relational or the column-store
/// backend, as decided by a feature gate evaluated per call.
///
/// With `mirror_writes` the edge is also written to the other backend;
/// a failed mirror write undoes the primary write and fails the request.
#[derive(Clone)]
pub struct GraphBackendSwitch {
    relational: Arc<dyn GraphBackend>,
    column: Arc<dyn GraphBackend>,
    gate: Arc<dyn FeatureGate>,
    flag: String,
    mirror_writes: bool,
}

impl GraphBackendSwitch {
    pub fn new(
        relational: Arc<dyn GraphBackend>,
        column: Arc<dyn GraphBackend>,
        gate: Arc<dyn FeatureGate>,
        flag: impl Into<String>,
    ) -> Self {
        Self {
            relational,
            column,
            gate,
            flag: flag.into(),
            mirror_writes: false,
        }
    }

    pub fn with_mirror_writes(mut self, mirror_writes: bool) -> Self {
        self.mirror_writes = mirror_writes;
        self
    }

    /// The active backend for this call
    pub async fn select(&self) -> Arc<dyn GraphBackend> {
        self.select_pair().await.0
    }

    /// (active, other)
    async fn select_pair(&self) -> (Arc<dyn GraphBackend>, Arc<dyn GraphBackend>) {
        if self.gate.is_enabled(&self.flag).await {
            (self.column.clone(), self.relational.clone())
        } else {
            (self.relational.clone(), self.column.clone())
        }
    }

    /// `Ok(None)` for a self-follow; nothing is written
    pub async fn follow(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<Option<FollowEdge>> {
        if from_user_id == to_user_id {
            return Ok(None);
        }

        let (primary, mirror) = self.select_pair().await;
        let edge = FollowEdge::new(from_user_id, to_user_id);
        primary.insert_edge(&edge).await?;

        if self.mirror_writes {
            match mirror.insert_edge(&edge).await {
                Ok(()) | Err(TimelineError::Validation(ValidationError::AlreadyFollowing)) => {
                    GraphMetrics::record_mirror(mirror.name(), "follow", true);
                }
                Err(e) => {
                    GraphMetrics::record_mirror(mirror.name(), "follow", false);
                    error!(
                        "{} mirror write failed for follow ({} -> {}): {}",
                        mirror.name(),
                        from_user_id,
                        to_user_id,
                        e
                    );
                    warn!("Rolling back {} follow after mirror failure", primary.name());
                    if let Err(rollback) = primary.delete_edge(from_user_id, to_user_id).await {
                        error!(error = %rollback, "Rollback of follow failed");
                    }
                    return Err(e);
                }
            }
        }

        debug!(backend = primary.name(), "Follow {} -> {}", from_user_id, to_user_id);
        Ok(Some(edge))
    }

    /// Number of edges removed; 0 for a self-unfollow or a missing edge
    pub async fn unfollow(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<u64> {
        if from_user_id == to_user_id {
            return Ok(0);
        }

        let (primary, mirror) = self.select_pair().await;
        if !self.mirror_writes {
            return primary.delete_edge(from_user_id, to_user_id).await;
        }

        let Some(edge) = primary.find_edge(from_user_id, to_user_id).await? else {
            return Ok(0);
        };
        let deleted = primary.delete_edge(from_user_id, to_user_id).await?;

        if let Err(e) = mirror.delete_edge(from_user_id, to_user_id).await {
            GraphMetrics::record_mirror(mirror.name(), "unfollow", false);
            error!(
                "{} mirror delete failed for unfollow ({} -> {}): {}",
                mirror.name(),
                from_user_id,
                to_user_id,
                e
            );
            warn!("Restoring {} edge after mirror failure", primary.name());
            if let Err(rollback) = primary.insert_edge(&edge).await {
                error!(error = %rollback, "Rollback of unfollow failed");
            }
            return Err(e);
        }

        GraphMetrics::record_mirror(mirror.name(), "unfollow", true);
        Ok(deleted)
    }

    /// Everyone trivially follows themselves
    pub async fn has_followed(&self, from_user_id: Uuid, to_user_id: Uuid) -> TimelineResult<bool> {
        if from_user_id == to_user_id {
            return Ok(true);
        }
        self.select().await.edge_exists(from_user_id, to_user_id).await
    }

    pub async fn following_count(&self, user_id: Uuid) -> TimelineResult<i64> {
        self.select().await.following_count(user_id).await
    }

    pub async fn follower_ids(&self, user_id: Uuid) -> TimelineResult<Vec<Uuid>> {
        self.select().await.follower_ids(user_id).await
    }

    pub async fn following_ids(&self, user_id: Uuid) -> TimelineResult<Vec<Uuid>> {
        self.select().await.following_ids(user_id).await
    }

    pub async fn followers(
        &self,
        user_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FollowEdge>> {
        self.select().await.followers(user_id, window, limit).await
    }

    pub async fn followings(
        &self,
        user_id: Uuid,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<FollowEdge>> {
        self.select().await.followings(user_id, window, limit).await
    }
}
