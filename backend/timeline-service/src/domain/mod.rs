pub mod edge;
pub mod feed;
pub mod post;

use chrono::{DateTime, Utc};

/// Records ordered by creation time, newest first, across every store
pub trait Timestamped {
    fn created_at(&self) -> DateTime<Utc>;
}
