//! The overflow guard.
//!
//! Runs at the start of every maintenance cycle and before any dated
//! creation. The guard only observes and reports: when the invariant is
//! already violated (missing, duplicated, or breached catch-all partition)
//! it fails loudly instead of reordering operations, because a violated
//! invariant means something outside this system has altered the partition
//! set.

use chrono::NaiveDate;

use ledgerpart_core::partition::Partition;
use ledgerpart_core::plan::{overflow_status, OverflowStatus};
use ledgerpart_core::policy::LifecyclePolicy;

/// Checks the overflow invariant over a catalog snapshot and logs the
/// verdict.
pub struct OverflowGuard {
    policy: LifecyclePolicy,
}

impl OverflowGuard {
    /// Creates a guard for the given policy.
    #[must_use]
    pub fn new(policy: LifecyclePolicy) -> Self {
        Self { policy }
    }

    /// Evaluates the invariant and logs accordingly. Returns the status so
    /// the scheduler can suppress dated-partition creation on violation.
    pub fn check(&self, partitions: &[Partition], today: NaiveDate) -> OverflowStatus {
        let status = overflow_status(partitions);
        match &status {
            OverflowStatus::Healthy { boundary } => {
                let headroom_days = (*boundary - today).num_days();
                if headroom_days < self.policy.creation_horizon_days {
                    tracing::info!(
                        boundary = %boundary,
                        headroom_days,
                        horizon_days = self.policy.creation_horizon_days,
                        "overflow boundary within horizon; replacement due"
                    );
                } else {
                    tracing::debug!(
                        boundary = %boundary,
                        headroom_days,
                        "overflow partition healthy"
                    );
                }
            }
            OverflowStatus::Missing => {
                tracing::error!(
                    metric = "ledgerpart_overflow_violations_total",
                    "no overflow partition exists; writes past the horizon will fail, \
                     dated-partition creation suspended"
                );
            }
            OverflowStatus::Multiple { names } => {
                tracing::error!(
                    partitions = ?names,
                    metric = "ledgerpart_overflow_violations_total",
                    "multiple unbounded partitions exist; dated-partition creation suspended"
                );
            }
            OverflowStatus::Breached { boundary, offender } => {
                tracing::error!(
                    boundary = %boundary,
                    offender = %offender,
                    metric = "ledgerpart_overflow_violations_total",
                    "dated partition reaches past the overflow boundary; \
                     partition set was modified externally, creation suspended"
                );
            }
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerpart_core::bounds::{DayRange, PartitionBounds};
    use ledgerpart_core::partition::{partition_name, WriteActivity, OVERFLOW_PARTITION};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn guard() -> OverflowGuard {
        OverflowGuard::new(LifecyclePolicy::default())
    }

    #[test]
    fn test_healthy_allows_creation() {
        let parts = vec![
            Partition {
                name: partition_name(d("2025-01-15")),
                bounds: PartitionBounds::Range(DayRange::single_day(d("2025-01-15"))),
                attached: true,
                activity: WriteActivity::default(),
            },
            Partition {
                name: OVERFLOW_PARTITION.to_string(),
                bounds: PartitionBounds::Unbounded { from: d("2025-03-01") },
                attached: true,
                activity: WriteActivity::default(),
            },
        ];
        let status = guard().check(&parts, d("2025-01-15"));
        assert!(status.allows_creation());
    }

    #[test]
    fn test_missing_overflow_blocks_creation() {
        let status = guard().check(&[], d("2025-01-15"));
        assert_eq!(status, OverflowStatus::Missing);
        assert!(!status.allows_creation());
    }
}
