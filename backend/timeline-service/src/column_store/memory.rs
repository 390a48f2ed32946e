use super::{range_is_empty, ColumnStore, Columns, Mutation, Row, RowKey};
use crate::error::{TimelineError, TimelineResult};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

type Table = BTreeMap<RowKey, Columns>;

/// In-process column store backed by one `BTreeMap` per table
#[derive(Clone, Default)]
pub struct MemoryColumnStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryColumnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the store were unreachable
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map_or(0, BTreeMap::len)
    }

    fn check_available(&self) -> TimelineResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TimelineError::ColumnStore(
                "column store unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ColumnStore for MemoryColumnStore {
    async fn mutate(&self, batch: Vec<Mutation>) -> TimelineResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        for mutation in batch {
            match mutation {
                Mutation::Put {
                    table,
                    key,
                    columns,
                } => {
                    tables.entry(table).or_default().insert(key, columns);
                }
                Mutation::Delete { table, key } => {
                    if let Some(rows) = tables.get_mut(&table) {
                        rows.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    async fn get(&self, table: &str, key: &RowKey) -> TimelineResult<Option<Columns>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|rows| rows.get(key)).cloned())
    }

    async fn scan(
        &self,
        table: &str,
        lower: Bound<RowKey>,
        upper: Bound<RowKey>,
        reverse: bool,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<Row>> {
        self.check_available()?;
        if range_is_empty(&lower, &upper) {
            return Ok(Vec::new());
        }

        let tables = self.tables.read().await;
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };

        let limit = limit.unwrap_or(usize::MAX);
        let to_row = |(key, columns): (&RowKey, &Columns)| Row {
            key: key.clone(),
            columns: columns.clone(),
        };
        let range = rows.range((lower, upper));
        let result = if reverse {
            range.rev().take(limit).map(to_row).collect()
        } else {
            range.take(limit).map(to_row).collect()
        };
        Ok(result)
    }
}
