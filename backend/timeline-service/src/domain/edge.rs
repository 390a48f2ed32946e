use super::Timestamped;
use crate::clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// "from follows to". Never a self-edge; at most one per ordered pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowEdge {
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl FollowEdge {
    pub fn new(from_user_id: Uuid, to_user_id: Uuid) -> Self {
        Self {
            from_user_id,
            to_user_id,
            created_at: clock::now(),
        }
    }
}

impl Timestamped for FollowEdge {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
