//! Ordered wide-column store
//!
//! Rows live in named tables, sorted by [`RowKey`]. The store offers atomic
//! multi-row batches, point reads and bounded range scans in either direction,
//! which is all the graph projections need.

mod memory;
mod redis_store;
pub mod row_key;

pub use self::memory::MemoryColumnStore;
pub use self::redis_store::RedisColumnStore;
pub use row_key::{KeyPart, RowKey};

use crate::error::TimelineResult;
use std::collections::BTreeMap;
use std::ops::Bound;

pub type Columns = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: RowKey,
    pub columns: Columns,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Put {
        table: String,
        key: RowKey,
        columns: Columns,
    },
    Delete {
        table: String,
        key: RowKey,
    },
}

impl Mutation {
    pub fn put(table: &str, key: RowKey, columns: Columns) -> Self {
        Mutation::Put {
            table: table.to_string(),
            key,
            columns,
        }
    }

    pub fn delete(table: &str, key: RowKey) -> Self {
        Mutation::Delete {
            table: table.to_string(),
            key,
        }
    }
}

#[async_trait::async_trait]
pub trait ColumnStore: Send + Sync {
    /// Apply every mutation or none of them
    async fn mutate(&self, batch: Vec<Mutation>) -> TimelineResult<()>;

    async fn get(&self, table: &str, key: &RowKey) -> TimelineResult<Option<Columns>>;

    /// Rows with keys between the bounds, ascending unless `reverse`
    async fn scan(
        &self,
        table: &str,
        lower: Bound<RowKey>,
        upper: Bound<RowKey>,
        reverse: bool,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<Row>>;
}

/// True when no key can satisfy both bounds
pub(crate) fn range_is_empty(lower: &Bound<RowKey>, upper: &Bound<RowKey>) -> bool {
    use Bound::*;
    match (lower, upper) {
        (Included(l), Included(u)) => l > u,
        (Included(l), Excluded(u)) | (Excluded(l), Included(u)) | (Excluded(l), Excluded(u)) => {
            l >= u
        }
        _ => false,
    }
}
