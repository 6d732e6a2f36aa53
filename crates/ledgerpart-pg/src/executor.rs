//! The partition executor.
//!
//! Applies one planned action per database transaction. The transaction's
//! first statement takes a partition-keyed advisory lock, so a second
//! instance attempting the same action blocks or no-ops instead of
//! corrupting state. The success audit row is inserted inside that same
//! transaction: the data change and its record commit together or not at
//! all. On failure the transaction rolls back and the error entry is
//! written afterwards on a pooled connection, so the attempt stays visible.
//!
//! Transient infrastructure failures are retried with exponential backoff
//! and jitter up to a bounded attempt count, each attempt audited. Planning
//! conflicts and precondition failures are never retried.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};

use ledgerpart_core::audit::AuditLogEntry;
use ledgerpart_core::partition::OVERFLOW_PARTITION;
use ledgerpart_core::plan::PlannedAction;

use crate::audit_store::AuditStore;
use crate::error::{PgError, Result};
use crate::snapshot::SnapshotStore;
use crate::sql;

/// Default maximum attempts per action (first try + retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base backoff duration between retries.
const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Maximum backoff duration.
const BACKOFF_MAX: Duration = Duration::from_secs(10);

/// Result of one transactional attempt. An applied action carries the
/// success entry that was committed with it.
enum Outcome {
    Applied(AuditLogEntry),
    Skipped(String),
}

/// Result of the action-specific work inside the transaction.
enum Step {
    Done,
    Skip(String),
}

/// Applies planned actions against the database.
pub struct PartitionExecutor {
    pool: PgPool,
    audit: AuditStore,
    snapshots: Arc<dyn SnapshotStore>,
    max_attempts: u32,
}

impl PartitionExecutor {
    /// Creates an executor over the given pool, audit store, and snapshot
    /// precondition.
    #[must_use]
    pub fn new(pool: PgPool, audit: AuditStore, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self {
            pool,
            audit,
            snapshots,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Overrides the bounded retry attempt count.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Applies one action and returns the audit entry describing the final
    /// outcome. Never panics and never propagates an error: every failure
    /// mode becomes an audited entry, and the caller decides what to do with
    /// the cycle.
    pub async fn execute(&self, action: &PlannedAction) -> AuditLogEntry {
        let name = action.partition_name();
        let operation = action.operation();
        let mut attempt: u32 = 1;
        let mut backoff = BACKOFF_BASE;

        loop {
            match self.apply_once(action, &name).await {
                Ok(Outcome::Applied(entry)) => {
                    tracing::info!(
                        operation = %operation,
                        partition = %name,
                        attempt,
                        "lifecycle action applied"
                    );
                    // The success entry committed with the transaction.
                    return entry;
                }
                Ok(Outcome::Skipped(reason)) => {
                    tracing::info!(
                        operation = %operation,
                        partition = %name,
                        reason = %reason,
                        "lifecycle action skipped"
                    );
                    let entry = AuditLogEntry::skipped(operation, &name, reason);
                    self.record(&entry).await;
                    return entry;
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        operation = %operation,
                        partition = %name,
                        attempt,
                        error = %err,
                        "transient failure; retrying with backoff"
                    );
                    let entry = AuditLogEntry::error(operation, &name, err.to_string())
                        .with_notes(format!("attempt {attempt} of {}", self.max_attempts));
                    self.record(&entry).await;

                    let delay = backoff.min(BACKOFF_MAX)
                        + Duration::from_millis(rand_jitter());
                    tokio::time::sleep(delay).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        operation = %operation,
                        partition = %name,
                        attempt,
                        error = %err,
                        "lifecycle action failed"
                    );
                    let entry = AuditLogEntry::error(operation, &name, err.to_string());
                    self.record(&entry).await;
                    return entry;
                }
            }
        }
    }

    /// One transactional attempt. Rolls back on any error.
    async fn apply_once(&self, action: &PlannedAction, name: &str) -> Result<Outcome> {
        // The snapshot precondition is checked before any transaction is
        // opened: a missing snapshot must fail closed without touching data.
        if let PlannedAction::Delete { partition, range } = action {
            if !self.snapshots.has_snapshot(*range).await? {
                return Err(PgError::SnapshotMissing {
                    partition: partition.clone(),
                });
            }
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(sql::advisory_lock_stmt())
            .bind(name)
            .execute(&mut *tx)
            .await?;

        let step = match action {
            PlannedAction::CreatePartition { date } => {
                self.create_partition(&mut tx, name, *date).await?
            }
            PlannedAction::Archive { partition } => {
                self.archive(&mut tx, partition, &sql::archive_table_name(partition))
                    .await?
            }
            PlannedAction::DeepArchive { partition } => {
                self.archive(&mut tx, partition, &sql::deep_archive_table_name(partition))
                    .await?
            }
            // Deletion intent is durable state in the audit log alone; the
            // success row below is the entire effect.
            PlannedAction::MarkForDeletion { .. } => Step::Done,
            PlannedAction::Delete { partition, .. } => self.delete(&mut tx, partition).await?,
            PlannedAction::ReplaceOverflow { new_boundary } => {
                self.replace_overflow(&mut tx, *new_boundary).await?
            }
            // Planner-rejected overlaps are recorded, nothing more.
            PlannedAction::SkippedOverlap { conflicting, .. } => Step::Skip(format!(
                "proposed range overlaps existing partition {conflicting}"
            )),
        };

        match step {
            Step::Done => {
                // Success becomes durable with the data change or not at
                // all; a failed insert here rolls everything back.
                let entry = AuditLogEntry::success(action.operation(), name);
                self.audit.append_in_tx(&mut tx, &entry).await?;
                tx.commit().await?;
                Ok(Outcome::Applied(entry))
            }
            Step::Skip(reason) => {
                tx.rollback().await?;
                Ok(Outcome::Skipped(reason))
            }
        }
    }

    async fn create_partition(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
        date: chrono::NaiveDate,
    ) -> Result<Step> {
        // Race-safe idempotency: another instance may have won the creation.
        if relation_exists(tx, name).await? {
            return Ok(Step::Skip("relation already exists".to_string()));
        }

        let range = ledgerpart_core::bounds::DayRange::single_day(date);
        sqlx::query(&sql::create_partition_stmt(name, range))
            .execute(&mut **tx)
            .await?;
        for stmt in sql::create_index_stmts(name) {
            sqlx::query(&stmt).execute(&mut **tx).await?;
        }
        Ok(Step::Done)
    }

    /// Copies all rows into `target` (created if absent), then detaches the
    /// source partition. Data is only ever copied and detached here, never
    /// deleted: a detached partition stays directly queryable.
    async fn archive(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        partition: &str,
        target: &str,
    ) -> Result<Step> {
        if !relation_exists(tx, partition).await? {
            return Ok(Step::Skip("partition no longer exists".to_string()));
        }

        sqlx::query(&sql::create_archive_stmt(target))
            .execute(&mut **tx)
            .await?;
        sqlx::query(&sql::copy_rows_stmt(partition, target))
            .execute(&mut **tx)
            .await?;
        if is_attached(tx, partition).await? {
            sqlx::query(&sql::detach_partition_stmt(partition))
                .execute(&mut **tx)
                .await?;
        }
        Ok(Step::Done)
    }

    /// Drops the partition table and its archive copies. The snapshot
    /// precondition has already been verified by the caller.
    async fn delete(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        partition: &str,
    ) -> Result<Step> {
        if is_attached(tx, partition).await? {
            sqlx::query(&sql::detach_partition_stmt(partition))
                .execute(&mut **tx)
                .await?;
        }
        sqlx::query(&sql::drop_table_stmt(&sql::archive_table_name(partition)))
            .execute(&mut **tx)
            .await?;
        sqlx::query(&sql::drop_table_stmt(&sql::deep_archive_table_name(partition)))
            .execute(&mut **tx)
            .await?;
        sqlx::query(&sql::drop_table_stmt(partition))
            .execute(&mut **tx)
            .await?;
        Ok(Step::Done)
    }

    /// Replaces the overflow partition in one transaction, so the ledger is
    /// never without a catch-all partition:
    ///
    /// 1. detach the current overflow and park it under a retired name
    /// 2. create the replacement with the advanced boundary and its indexes
    /// 3. re-route any rows the old overflow held through the parent
    /// 4. drop the parked table
    ///
    /// If a parked row's timestamp has no covering partition the re-insert
    /// fails and the whole transaction rolls back, leaving the original
    /// overflow in place.
    async fn replace_overflow(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        new_boundary: chrono::NaiveDate,
    ) -> Result<Step> {
        if !relation_exists(tx, OVERFLOW_PARTITION).await? {
            return Err(PgError::Catalog {
                message: format!("overflow partition {OVERFLOW_PARTITION} does not exist"),
            });
        }
        let retired = format!("{OVERFLOW_PARTITION}_retired");

        if is_attached(tx, OVERFLOW_PARTITION).await? {
            sqlx::query(&sql::detach_partition_stmt(OVERFLOW_PARTITION))
                .execute(&mut **tx)
                .await?;
        }
        sqlx::query(&sql::rename_table_stmt(OVERFLOW_PARTITION, &retired))
            .execute(&mut **tx)
            .await?;

        sqlx::query(&sql::create_overflow_stmt(OVERFLOW_PARTITION, new_boundary))
            .execute(&mut **tx)
            .await?;
        for stmt in sql::create_index_stmts(OVERFLOW_PARTITION) {
            sqlx::query(&stmt).execute(&mut **tx).await?;
        }

        sqlx::query(&sql::reinsert_through_parent_stmt(&retired))
            .execute(&mut **tx)
            .await?;
        sqlx::query(&sql::drop_table_stmt(&retired))
            .execute(&mut **tx)
            .await?;
        Ok(Step::Done)
    }

    /// Appends an error or skipped entry outside any data transaction, so
    /// it survives the rollback it describes. Append failures here are
    /// logged and swallowed: maintenance must degrade to falling behind,
    /// not to blocking on its own bookkeeping. Success entries never take
    /// this path; they commit inside the action transaction.
    async fn record(&self, entry: &AuditLogEntry) {
        if let Err(err) = self.audit.append(entry).await {
            tracing::error!(
                operation = %entry.operation,
                partition = %entry.partition_name,
                status = %entry.status,
                error = %err,
                "failed to append audit entry"
            );
        }
    }
}

async fn relation_exists(tx: &mut Transaction<'_, Postgres>, name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(sql::relation_exists_stmt())
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;
    Ok(exists)
}

async fn is_attached(tx: &mut Transaction<'_, Postgres>, name: &str) -> Result<bool> {
    let attached: bool = sqlx::query_scalar(sql::is_attached_stmt())
        .bind(name)
        .bind(sql::LEDGER_TABLE)
        .fetch_one(&mut **tx)
        .await?;
    Ok(attached)
}

/// Generates random jitter for backoff (0-100ms).
fn rand_jitter() -> u64 {
    // Subsecond clock noise is plenty for de-syncing retry storms here,
    // without pulling in a full rand dependency.
    use std::time::SystemTime;
    let seed = u64::from(
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos(),
    );
    seed % 100
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use sqlx::postgres::PgPoolOptions;

    use ledgerpart_core::audit::{AuditOperation, AuditStatus};
    use ledgerpart_core::bounds::DayRange;

    use crate::snapshot::SnapshotStore;

    /// Snapshot store that never has coverage.
    struct NoSnapshots;

    #[async_trait]
    impl SnapshotStore for NoSnapshots {
        async fn has_snapshot(&self, _range: DayRange) -> Result<bool> {
            Ok(false)
        }
    }

    /// A lazily-connecting pool pointed at nothing. The snapshot
    /// precondition runs before any connection is acquired, so refusals can
    /// be exercised without a live database.
    fn unreachable_pool() -> PgPool {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(250))
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .expect("lazy pool")
    }

    #[tokio::test]
    async fn test_delete_without_snapshot_fails_closed() {
        let pool = unreachable_pool();
        let executor = PartitionExecutor::new(
            pool.clone(),
            AuditStore::new(pool),
            Arc::new(NoSnapshots),
        );

        let date = NaiveDate::from_ymd_opt(2023, 1, 1).expect("date");
        let action = PlannedAction::Delete {
            partition: "ledger_entries_p20230101".to_string(),
            range: DayRange::single_day(date),
        };

        let entry = executor.execute(&action).await;
        assert_eq!(entry.operation, AuditOperation::Delete);
        assert_eq!(entry.status, AuditStatus::Error);
        assert!(entry
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("refusing to delete"));
    }

    #[test]
    fn test_missing_snapshot_is_not_retried() {
        // A missing snapshot is a precondition failure, not an
        // infrastructure hiccup; the next cycle re-evaluates it.
        let err = PgError::SnapshotMissing {
            partition: "ledger_entries_p20230101".to_string(),
        };
        assert!(!err.is_transient());
    }
}
