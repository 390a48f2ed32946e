mod backend_switch;
mod column_repository;
mod memory_repository;
mod postgres_graph;
mod postgres_repository;
mod r#trait;

pub use backend_switch::{GraphBackendSwitch, DEFAULT_COLUMN_STORE_FLAG};
pub use column_repository::{ColumnGraphBackend, FOLLOWERS_TABLE, FOLLOWINGS_TABLE};
pub use memory_repository::{MemoryGraphBackend, MemoryTimelineRepository};
pub use postgres_graph::PostgresGraphBackend;
pub use postgres_repository::{connect_pool, PostgresTimelineRepository};
pub use r#trait::{
    CounterRepository, EdgeExport, EdgeExportCursor, FeedRepository, GraphBackend,
    PostRepository, UserDirectory,
};

#[cfg(test)]
pub use r#trait::MockGraphBackend;
