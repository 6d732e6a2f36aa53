//! The snapshot precondition seam.
//!
//! Deleting a partition is only permitted once a downstream snapshot job has
//! aggregated the window it covers. That job is an external collaborator;
//! this module owns only the interface the delete path consults, plus the
//! production implementation over the snapshot table the job maintains.

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use ledgerpart_core::bounds::DayRange;

use crate::error::Result;

/// Answers "does a verified snapshot cover this day range".
///
/// Implementations must fail closed: when in doubt, answer `false` or error.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns true if every day in `range` is covered by a snapshot.
    async fn has_snapshot(&self, range: DayRange) -> Result<bool>;
}

/// Snapshot check over the daily aggregate table the snapshot job writes.
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    /// Table maintained by the external daily snapshot job.
    pub const SNAPSHOT_TABLE: &'static str = "ledger_daily_snapshots";

    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn has_snapshot(&self, range: DayRange) -> Result<bool> {
        // Every day of the half-open range must have at least one snapshot
        // row; a partial covering does not count.
        let covered_days: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT snapshot_date)
             FROM ledger_daily_snapshots
             WHERE snapshot_date >= $1 AND snapshot_date < $2",
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&self.pool)
        .await?;

        Ok(covered_days >= (range.end - range.start).num_days())
    }
}
