use super::Timestamped;
use crate::clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use timeline_cache::ListRecord;
use uuid::Uuid;

/// Delivery of one post into one viewer's feed. At most one per (viewer, post).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedEntry {
    pub id: Uuid,
    pub viewer_id: Uuid,
    pub post_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl FeedEntry {
    pub fn new(viewer_id: Uuid, post_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            viewer_id,
            post_id,
            created_at,
        }
    }

    pub fn now(viewer_id: Uuid, post_id: Uuid) -> Self {
        Self::new(viewer_id, post_id, clock::now())
    }
}

impl Timestamped for FeedEntry {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl ListRecord for FeedEntry {
    fn sort_key(&self) -> i64 {
        self.created_at.timestamp_micros()
    }
}
