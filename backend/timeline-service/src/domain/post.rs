use super::Timestamped;
use crate::clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use timeline_cache::ListRecord;
use uuid::Uuid;

/// A post; counters are denormalized onto the row and cached separately
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn new(author_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id,
            content: content.into(),
            likes_count: 0,
            comments_count: 0,
            created_at: clock::now(),
        }
    }
}

impl Timestamped for Post {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl ListRecord for Post {
    fn sort_key(&self) -> i64 {
        self.created_at.timestamp_micros()
    }
}

/// Counted attributes stored on the post row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostCounter {
    Likes,
    Comments,
}

impl PostCounter {
    pub fn column(&self) -> &'static str {
        match self {
            PostCounter::Likes => "likes_count",
            PostCounter::Comments => "comments_count",
        }
    }
}
