use super::{range_is_empty, ColumnStore, Columns, Mutation, Row, RowKey};
use crate::error::{TimelineError, TimelineResult};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use resilience::{with_retry, with_timeout, ServiceConfig};
use std::future::Future;
use std::ops::Bound;
use std::time::Duration;
use tracing::{debug, info};

/// Column store on Redis.
///
/// Each table keeps a sorted set of row keys, all with score 0 so that
/// ZRANGEBYLEX walks them in byte order, plus one hash per row holding its
/// columns. Batches run inside MULTI/EXEC.
#[derive(Clone)]
pub struct RedisColumnStore {
    manager: ConnectionManager,
    namespace: String,
    op_timeout: Duration,
}

impl RedisColumnStore {
    pub fn new(manager: ConnectionManager, namespace: impl Into<String>, op_timeout: Duration) -> Self {
        Self {
            manager,
            namespace: namespace.into(),
            op_timeout,
        }
    }

    pub async fn connect(url: &str, config: ServiceConfig) -> TimelineResult<Self> {
        let client = Client::open(url).map_err(column_error)?;
        let manager = match config.connect_retry.clone() {
            Some(retry) => with_retry(retry, || ConnectionManager::new(client.clone()))
                .await
                .map_err(|e| column_error(e.into_last()))?,
            None => ConnectionManager::new(client).await.map_err(column_error)?,
        };

        info!("Connected to column store at {}", url);
        Ok(Self::new(manager, "cs", config.timeout.duration))
    }

    fn index_key(&self, table: &str) -> String {
        format!("{}:{}:idx", self.namespace, table)
    }

    fn row_key(&self, table: &str, key: &str) -> String {
        format!("{}:{}:row:{}", self.namespace, table, key)
    }

    async fn run<T, F>(&self, op: &'static str, fut: F) -> TimelineResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match with_timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(column_error),
            Err(e) => {
                debug!(op, "Column store command exceeded deadline");
                Err(TimelineError::from(e))
            }
        }
    }
}

fn column_error(err: redis::RedisError) -> TimelineError {
    TimelineError::ColumnStore(err.to_string())
}

fn lex_lower(bound: &Bound<RowKey>) -> String {
    match bound {
        Bound::Included(key) => format!("[{}", key),
        Bound::Excluded(key) => format!("({}", key),
        Bound::Unbounded => "-".to_string(),
    }
}

fn lex_upper(bound: &Bound<RowKey>) -> String {
    match bound {
        Bound::Included(key) => format!("[{}", key),
        Bound::Excluded(key) => format!("({}", key),
        Bound::Unbounded => "+".to_string(),
    }
}

#[async_trait::async_trait]
impl ColumnStore for RedisColumnStore {
    async fn mutate(&self, batch: Vec<Mutation>) -> TimelineResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for mutation in &batch {
            match mutation {
                Mutation::Put {
                    table,
                    key,
                    columns,
                } => {
                    let row = self.row_key(table, key.as_str());
                    let fields: Vec<(&str, &str)> = columns
                        .iter()
                        .map(|(name, value)| (name.as_str(), value.as_str()))
                        .collect();
                    pipe.del(&row).ignore();
                    if !fields.is_empty() {
                        pipe.hset_multiple(&row, &fields).ignore();
                    }
                    pipe.zadd(self.index_key(table), key.as_str(), 0).ignore();
                }
                Mutation::Delete { table, key } => {
                    pipe.del(self.row_key(table, key.as_str())).ignore();
                    pipe.zrem(self.index_key(table), key.as_str()).ignore();
                }
            }
        }

        let mut conn = self.manager.clone();
        self.run("mutate", async move { pipe.query_async::<_, ()>(&mut conn).await })
            .await
    }

    async fn get(&self, table: &str, key: &RowKey) -> TimelineResult<Option<Columns>> {
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.zscore(self.index_key(table), key.as_str())
            .hgetall(self.row_key(table, key.as_str()));
        let (score, columns): (Option<f64>, Columns) = self
            .run("get", async move { pipe.query_async(&mut conn).await })
            .await?;
        Ok(score.map(|_| columns))
    }

    async fn scan(
        &self,
        table: &str,
        lower: Bound<RowKey>,
        upper: Bound<RowKey>,
        reverse: bool,
        limit: Option<usize>,
    ) -> TimelineResult<Vec<Row>> {
        if range_is_empty(&lower, &upper) || limit == Some(0) {
            return Ok(Vec::new());
        }

        let index = self.index_key(table);
        let (min, max) = (lex_lower(&lower), lex_upper(&upper));
        let mut conn = self.manager.clone();
        let keys: Vec<String> = self
            .run("scan", async move {
                match (reverse, limit) {
                    (false, None) => conn.zrangebylex(index, min, max).await,
                    (false, Some(n)) => conn.zrangebylex_limit(index, min, max, 0, n as isize).await,
                    (true, None) => conn.zrevrangebylex(index, max, min).await,
                    (true, Some(n)) => conn.zrevrangebylex_limit(index, max, min, 0, n as isize).await,
                }
            })
            .await?;

        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.hgetall(self.row_key(table, key));
        }
        let mut conn = self.manager.clone();
        let rows: Vec<Columns> = self
            .run("scan_rows", async move { pipe.query_async(&mut conn).await })
            .await?;

        Ok(keys
            .into_iter()
            .zip(rows)
            .map(|(key, columns)| Row {
                key: RowKey::from_raw(key),
                columns,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_bounds() {
        let key = RowKey::from_raw("abc:0001");
        assert_eq!(lex_lower(&Bound::Included(key.clone())), "[abc:0001");
        assert_eq!(lex_upper(&Bound::Excluded(key)), "(abc:0001");
        assert_eq!(lex_lower(&Bound::Unbounded), "-");
        assert_eq!(lex_upper(&Bound::Unbounded), "+");
    }
}
