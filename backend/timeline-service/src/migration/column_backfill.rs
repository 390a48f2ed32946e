//! Relational → column-store migration
//!
//! [`ColumnBackfill`] copies every relational edge into the column backend,
//! keeping each edge's original timestamp. [`BackendVerifier`] then reads
//! both backends user by user and reports every disagreement.

use crate::domain::edge::FollowEdge;
use crate::error::{TimelineError, ValidationError};
use crate::pagination::TimeWindow;
use crate::repository::{EdgeExport, GraphBackend};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillStats {
    pub batches: u64,
    pub edges_read: u64,
    pub edges_written: u64,
    /// Already present in the column backend
    pub edges_skipped: u64,
}

pub struct ColumnBackfill {
    source: Arc<dyn EdgeExport>,
    target: Arc<dyn GraphBackend>,
    batch_size: usize,
}

impl ColumnBackfill {
    pub const DEFAULT_BATCH_SIZE: usize = 1000;

    pub fn new(source: Arc<dyn EdgeExport>, target: Arc<dyn GraphBackend>) -> Self {
        Self {
            source,
            target,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Copy all edges, oldest first. Safe to re-run: present edges are skipped.
    pub async fn run(&self) -> Result<BackfillStats> {
        info!(
            target = self.target.name(),
            batch_size = self.batch_size,
            "Starting column-store backfill"
        );

        let mut stats = BackfillStats::default();
        let mut cursor = None;

        loop {
            let batch = self
                .source
                .export_edges(cursor, self.batch_size)
                .await
                .with_context(|| format!("Failed to export edge batch {}", stats.batches + 1))?;
            let Some(last) = batch.last() else {
                break;
            };
            cursor = Some((last.created_at, last.from_user_id, last.to_user_id));
            stats.batches += 1;
            stats.edges_read += batch.len() as u64;

            for edge in &batch {
                if self.copy_edge(edge).await? {
                    stats.edges_written += 1;
                } else {
                    stats.edges_skipped += 1;
                }
            }

            info!(
                batch = stats.batches,
                written = stats.edges_written,
                skipped = stats.edges_skipped,
                "Backfilled edge batch"
            );

            if batch.len() < self.batch_size {
                break;
            }
        }

        info!(
            "Column-store backfill completed: {} edges read, {} written, {} skipped",
            stats.edges_read, stats.edges_written, stats.edges_skipped
        );
        Ok(stats)
    }

    async fn copy_edge(&self, edge: &FollowEdge) -> Result<bool> {
        let exists = self
            .target
            .edge_exists(edge.from_user_id, edge.to_user_id)
            .await
            .context("Failed to check edge in column backend")?;
        if exists {
            return Ok(false);
        }

        match self.target.insert_edge(edge).await {
            Ok(()) => Ok(true),
            Err(TimelineError::Validation(ValidationError::AlreadyFollowing)) => Ok(false),
            Err(e) => Err(e).with_context(|| {
                format!(
                    "Failed to write edge {} -> {}",
                    edge.from_user_id, edge.to_user_id
                )
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub user_id: Uuid,
    pub check: &'static str,
    pub detail: String,
}

#[derive(Debug, Default, Clone)]
pub struct VerifyReport {
    pub users_checked: u64,
    pub mismatches: Vec<Mismatch>,
}

impl VerifyReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compares two graph backends as readers see them
pub struct BackendVerifier {
    users: Arc<dyn EdgeExport>,
    expected: Arc<dyn GraphBackend>,
    actual: Arc<dyn GraphBackend>,
}

impl BackendVerifier {
    pub fn new(
        users: Arc<dyn EdgeExport>,
        expected: Arc<dyn GraphBackend>,
        actual: Arc<dyn GraphBackend>,
    ) -> Self {
        Self {
            users,
            expected,
            actual,
        }
    }

    pub async fn run(&self) -> Result<VerifyReport> {
        let users = self
            .users
            .graph_user_ids()
            .await
            .context("Failed to list graph users")?;
        info!(
            users = users.len(),
            expected = self.expected.name(),
            actual = self.actual.name(),
            "Verifying graph backends"
        );

        let mut report = VerifyReport::default();
        for user_id in users {
            self.verify_user(user_id, &mut report.mismatches)
                .await
                .with_context(|| format!("Failed to verify user {}", user_id))?;
            report.users_checked += 1;
        }

        for mismatch in &report.mismatches {
            warn!(
                user = %mismatch.user_id,
                check = mismatch.check,
                "Backend mismatch: {}",
                mismatch.detail
            );
        }
        Ok(report)
    }

    async fn verify_user(&self, user_id: Uuid, mismatches: &mut Vec<Mismatch>) -> Result<()> {
        let expected_count = self.expected.following_count(user_id).await?;
        let actual_count = self.actual.following_count(user_id).await?;
        if expected_count != actual_count {
            mismatches.push(Mismatch {
                user_id,
                check: "following_count",
                detail: format!("expected {}, found {}", expected_count, actual_count),
            });
        }

        let expected = self.expected.followings(user_id, TimeWindow::Newest, None).await?;
        let actual = self.actual.followings(user_id, TimeWindow::Newest, None).await?;
        compare_edges(user_id, "followings", &expected, &actual, mismatches);

        for edge in &expected {
            if !self.actual.edge_exists(user_id, edge.to_user_id).await? {
                mismatches.push(Mismatch {
                    user_id,
                    check: "has_followed",
                    detail: format!("missing edge to {}", edge.to_user_id),
                });
            }
        }

        let expected = self.expected.followers(user_id, TimeWindow::Newest, None).await?;
        let actual = self.actual.followers(user_id, TimeWindow::Newest, None).await?;
        compare_edges(user_id, "followers", &expected, &actual, mismatches);

        Ok(())
    }
}

fn edge_signature(edges: &[FollowEdge]) -> Vec<(Uuid, Uuid, i64)> {
    edges
        .iter()
        .map(|e| (e.from_user_id, e.to_user_id, e.created_at.timestamp_micros()))
        .collect()
}

fn compare_edges(
    user_id: Uuid,
    check: &'static str,
    expected: &[FollowEdge],
    actual: &[FollowEdge],
    mismatches: &mut Vec<Mismatch>,
) {
    let expected = edge_signature(expected);
    let actual = edge_signature(actual);
    if expected == actual {
        return;
    }

    let expected_set: HashSet<_> = expected.iter().collect();
    let actual_set: HashSet<_> = actual.iter().collect();
    let missing = expected_set.difference(&actual_set).count();
    let extra = actual_set.difference(&expected_set).count();
    let detail = if missing == 0 && extra == 0 {
        "same edges in a different order".to_string()
    } else {
        format!("{} missing, {} unexpected", missing, extra)
    };
    mismatches.push(Mismatch {
        user_id,
        check,
        detail,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_store::MemoryColumnStore;
    use crate::repository::{ColumnGraphBackend, MemoryGraphBackend};

    fn backends() -> (Arc<MemoryGraphBackend>, Arc<ColumnGraphBackend>) {
        let relational = Arc::new(MemoryGraphBackend::new());
        let column = Arc::new(ColumnGraphBackend::new(Arc::new(MemoryColumnStore::new())));
        (relational, column)
    }

    async fn seed(relational: &MemoryGraphBackend, pairs: &[(Uuid, Uuid)]) {
        for (from, to) in pairs {
            relational.insert_edge(&FollowEdge::new(*from, *to)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_backfill_copies_every_edge_in_small_batches() {
        let (relational, column) = backends();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        seed(&relational, &[(a, b), (a, c), (b, c), (c, a), (b, a)]).await;

        let stats = ColumnBackfill::new(relational.clone(), column.clone())
            .with_batch_size(2)
            .run()
            .await
            .unwrap();

        assert_eq!(stats.edges_read, 5);
        assert_eq!(stats.edges_written, 5);
        assert_eq!(stats.edges_skipped, 0);
        assert_eq!(stats.batches, 3);
        assert!(column.edge_exists(c, a).await.unwrap());
        assert_eq!(column.following_count(a).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_backfill_rerun_skips_present_edges() {
        let (relational, column) = backends();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        seed(&relational, &[(a, b), (b, a)]).await;

        let backfill = ColumnBackfill::new(relational.clone(), column.clone());
        backfill.run().await.unwrap();
        let again = backfill.run().await.unwrap();

        assert_eq!(again.edges_written, 0);
        assert_eq!(again.edges_skipped, 2);
    }

    #[tokio::test]
    async fn test_verifier_passes_after_backfill() {
        let (relational, column) = backends();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        seed(&relational, &[(a, b), (a, c), (c, b)]).await;

        ColumnBackfill::new(relational.clone(), column.clone())
            .run()
            .await
            .unwrap();
        let report = BackendVerifier::new(relational.clone(), relational.clone(), column.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(report.users_checked, 3);
        assert!(report.is_consistent(), "{:?}", report.mismatches);
    }

    #[tokio::test]
    async fn test_verifier_reports_missing_edge() {
        let (relational, column) = backends();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        seed(&relational, &[(a, b)]).await;
        ColumnBackfill::new(relational.clone(), column.clone())
            .run()
            .await
            .unwrap();
        seed(&relational, &[(a, c)]).await;

        let report = BackendVerifier::new(relational.clone(), relational.clone(), column.clone())
            .run()
            .await
            .unwrap();

        assert!(!report.is_consistent());
        let checks: HashSet<_> = report
            .mismatches
            .iter()
            .filter(|m| m.user_id == a)
            .map(|m| m.check)
            .collect();
        assert!(checks.contains("following_count"));
        assert!(checks.contains("followings"));
        assert!(checks.contains("has_followed"));
        assert!(report
            .mismatches
            .iter()
            .any(|m| m.user_id == c && m.check == "followers"));
    }
}
