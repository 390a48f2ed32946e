pub mod column_backfill;

pub use column_backfill::{BackendVerifier, BackfillStats, ColumnBackfill, Mismatch, VerifyReport};
