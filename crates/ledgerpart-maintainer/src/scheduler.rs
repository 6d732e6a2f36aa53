//! The maintenance scheduler.
//!
//! A single long-lived [`Maintainer`] owns all run state; there are no
//! process-wide globals. Ticks are strictly sequential: a tick that arrives
//! while one is still running is skipped and logged, never queued.
//!
//! Within one cycle the phase order is fixed: overflow guard, creation,
//! stage advancement, deletion (deep-cleanup cycles only). Each action is
//! isolated — one partition's failure never aborts the rest of the tick,
//! and no error ever propagates toward the ledger write path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use sqlx::postgres::PgPool;
use tokio::sync::Mutex;

use ledgerpart_core::audit::{AuditLogEntry, AuditStatus};
use ledgerpart_core::plan::{plan, PlannedAction};
use ledgerpart_core::policy::LifecyclePolicy;
use ledgerpart_pg::{
    AuditStore, CatalogReader, OverflowGuard, PartitionExecutor, Result, SnapshotStore,
};

use crate::metrics;

/// Which cadence a cycle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// Frequent cycle: overflow guard, creation, stage advancement.
    Routine,
    /// Infrequent cycle: everything, including the deletion pass.
    DeepCleanup,
}

impl CycleKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::DeepCleanup => "deep_cleanup",
        }
    }
}

/// Counters summarizing one completed cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleOutcome {
    /// Actions the planner emitted (after cadence filtering).
    pub planned: usize,
    /// Actions that applied successfully.
    pub applied: usize,
    /// Actions recorded as skipped.
    pub skipped: usize,
    /// Actions that failed after retries.
    pub failed: usize,
    /// Whether the overflow invariant held at the start of the cycle.
    pub overflow_healthy: bool,
}

/// Drives maintenance cycles over the catalog, planner, and executor.
pub struct Maintainer {
    catalog: CatalogReader,
    audit: AuditStore,
    executor: PartitionExecutor,
    guard: OverflowGuard,
    policy: LifecyclePolicy,
    /// Set while a cycle is running; exposed to the readiness endpoint.
    in_progress: AtomicBool,
    /// Serializes cycles; `try_lock` failure means "skip this tick".
    cycle_lock: Mutex<()>,
}

impl Maintainer {
    /// Wires up a maintainer over one connection pool.
    #[must_use]
    pub fn new(pool: PgPool, policy: LifecyclePolicy, snapshots: Arc<dyn SnapshotStore>) -> Self {
        let audit = AuditStore::new(pool.clone());
        Self {
            catalog: CatalogReader::new(pool.clone()),
            executor: PartitionExecutor::new(pool, audit.clone(), snapshots),
            audit,
            guard: OverflowGuard::new(policy),
            policy,
            in_progress: AtomicBool::new(false),
            cycle_lock: Mutex::new(()),
        }
    }

    /// Ensures the audit schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn prepare(&self) -> Result<()> {
        self.audit.migrate().await
    }

    /// Returns true while a cycle is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Computes the current plan without executing anything.
    ///
    /// This is the operator-facing dry run: the full planner logic runs
    /// against live catalog and audit state, and the resulting action list
    /// is returned for inspection.
    ///
    /// # Errors
    ///
    /// Returns an error if catalog or audit reads fail.
    pub async fn plan_only(&self) -> Result<Vec<PlannedAction>> {
        let today = Utc::now().date_naive();
        let partitions = self.catalog.list_partitions().await?;
        // The guard still runs so violations are logged, but a dry run does
        // not touch counters.
        let _ = self.guard.check(&partitions, today);
        let view = self.audit.load_view().await?;
        Ok(plan(&partitions, &self.policy, &view, today))
    }

    /// Most recent audit entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the audit query fails.
    pub async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        self.audit.recent(limit).await
    }

    /// Runs one maintenance cycle, or skips it if one is already running.
    ///
    /// Returns `None` for a skipped tick. A completed cycle always returns
    /// an outcome, even when individual actions failed: failures are audited
    /// per action and the cycle moves on.
    ///
    /// # Errors
    ///
    /// Returns an error only if the cycle could not start at all (catalog or
    /// audit reads failed).
    pub async fn run_cycle(&self, kind: CycleKind) -> Result<Option<CycleOutcome>> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            tracing::warn!(
                kind = kind.as_str(),
                "previous maintenance cycle still running; skipping tick"
            );
            metrics::record_skipped_cycle(kind.as_str());
            return Ok(None);
        };

        self.in_progress.store(true, Ordering::Release);
        let result = self.run_cycle_inner(kind).await;
        self.in_progress.store(false, Ordering::Release);
        result.map(Some)
    }

    async fn run_cycle_inner(&self, kind: CycleKind) -> Result<CycleOutcome> {
        let timer = metrics::CycleTimer::start(kind.as_str());
        let today = Utc::now().date_naive();

        tracing::info!(
            kind = kind.as_str(),
            date = %today,
            "starting maintenance cycle"
        );

        let partitions = self.catalog.list_partitions().await?;
        let status = self.guard.check(&partitions, today);
        if !status.allows_creation() {
            metrics::record_overflow_violation();
        }

        let view = self.audit.load_view().await?;
        let mut actions = plan(&partitions, &self.policy, &view, today);

        // Deletion only runs on the deep-cleanup cadence; partitions stay
        // marked until then regardless of how long ago the grace elapsed.
        if kind == CycleKind::Routine {
            actions.retain(|action| !action.is_delete());
        }

        let mut outcome = CycleOutcome {
            planned: actions.len(),
            overflow_healthy: status.allows_creation(),
            ..CycleOutcome::default()
        };

        for action in &actions {
            let entry = self.executor.execute(action).await;
            metrics::record_action(entry.operation.as_str(), entry.status.as_str());
            match entry.status {
                AuditStatus::Success => outcome.applied += 1,
                AuditStatus::Skipped => outcome.skipped += 1,
                AuditStatus::Error => outcome.failed += 1,
            }
        }

        tracing::info!(
            kind = kind.as_str(),
            planned = outcome.planned,
            applied = outcome.applied,
            skipped = outcome.skipped,
            failed = outcome.failed,
            overflow_healthy = outcome.overflow_healthy,
            "maintenance cycle completed"
        );
        timer.finish();
        Ok(outcome)
    }
}
