//! The partition planner.
//!
//! [`plan`] is a pure function from `(catalog snapshot, policy, audit view,
//! today)` to an ordered list of [`PlannedAction`]s. It performs no I/O and
//! is recomputed from durable state on every cycle, so no plan ever needs to
//! survive a process restart.
//!
//! Action ordering within one plan is fixed: overflow replacement, then
//! partition creation in ascending date order, then stage advancement, then
//! deletion. Overflow repair must never race with dated-partition creation;
//! everything else follows from executing the list front to back.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditOperation, AuditView};
use crate::bounds::{DayRange, PartitionBounds};
use crate::partition::Partition;
use crate::policy::LifecyclePolicy;
use crate::stage::LifecycleStage;

/// A partition just past the active boundary that still shows write activity
/// is held back from archival for this many days.
pub const ACTIVITY_HOLD_WINDOW_DAYS: i64 = 10;

/// One action the executor should apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum PlannedAction {
    /// Replace the overflow partition, advancing its lower boundary.
    ReplaceOverflow {
        /// New inclusive lower boundary for the catch-all range.
        new_boundary: NaiveDate,
    },
    /// Create the dated partition covering `[date, date + 1)`.
    CreatePartition {
        /// Start date of the new partition.
        date: NaiveDate,
    },
    /// A proposed creation conflicted with an existing range. Recorded as
    /// `skipped`, never forced: silently resolving a range conflict risks
    /// data loss.
    SkippedOverlap {
        /// Start date of the rejected proposal.
        date: NaiveDate,
        /// Name of the partition the proposal overlapped.
        conflicting: String,
    },
    /// Copy the partition's rows to the archive table and detach it.
    Archive {
        /// Target partition name.
        partition: String,
    },
    /// Copy the partition's rows to the deep archive table.
    DeepArchive {
        /// Target partition name.
        partition: String,
    },
    /// Record deletion intent in the audit log. Touches no data.
    MarkForDeletion {
        /// Target partition name.
        partition: String,
    },
    /// Physically drop the partition and its archive copies. Only planned
    /// once the grace period has elapsed; the executor still verifies the
    /// snapshot precondition.
    Delete {
        /// Target partition name.
        partition: String,
        /// Day range the partition covers, for the snapshot check.
        range: DayRange,
    },
}

impl PlannedAction {
    /// The audit operation this action records.
    #[must_use]
    pub const fn operation(&self) -> AuditOperation {
        match self {
            Self::ReplaceOverflow { .. } => AuditOperation::ReplaceOverflow,
            Self::CreatePartition { .. } | Self::SkippedOverlap { .. } => AuditOperation::Create,
            Self::Archive { .. } => AuditOperation::Archive,
            Self::DeepArchive { .. } => AuditOperation::DeepArchive,
            Self::MarkForDeletion { .. } => AuditOperation::MarkForDeletion,
            Self::Delete { .. } => AuditOperation::Delete,
        }
    }

    /// Target partition name (derived for creations).
    #[must_use]
    pub fn partition_name(&self) -> String {
        match self {
            Self::ReplaceOverflow { .. } => crate::partition::OVERFLOW_PARTITION.to_string(),
            Self::CreatePartition { date } | Self::SkippedOverlap { date, .. } => {
                crate::partition::partition_name(*date)
            }
            Self::Archive { partition }
            | Self::DeepArchive { partition }
            | Self::MarkForDeletion { partition }
            | Self::Delete { partition, .. } => partition.clone(),
        }
    }

    /// Returns true for the irreversible deletion action.
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// Health of the overflow partition invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum OverflowStatus {
    /// Exactly one overflow partition exists and no dated range reaches it.
    Healthy {
        /// Current inclusive lower boundary of the catch-all range.
        boundary: NaiveDate,
    },
    /// No overflow partition exists; writes past the horizon would fail.
    Missing,
    /// More than one unbounded partition exists.
    Multiple {
        /// Names of the conflicting unbounded partitions.
        names: Vec<String>,
    },
    /// A dated partition's range reaches at or past the overflow boundary.
    /// Indicates external/manual corruption of the partition set.
    Breached {
        /// Current overflow boundary.
        boundary: NaiveDate,
        /// Name of the dated partition violating the boundary.
        offender: String,
    },
}

impl OverflowStatus {
    /// Returns true if dated-partition creation is safe this cycle.
    #[must_use]
    pub const fn allows_creation(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

/// Checks the overflow invariant over a catalog snapshot.
///
/// Only attached partitions participate: a detached (archived) table no
/// longer receives writes and cannot conflict with the catch-all range.
#[must_use]
pub fn overflow_status(partitions: &[Partition]) -> OverflowStatus {
    let overflow: Vec<&Partition> = partitions
        .iter()
        .filter(|p| p.attached && p.is_overflow())
        .collect();

    let boundary = match overflow.as_slice() {
        [] => return OverflowStatus::Missing,
        [single] => match single.bounds {
            PartitionBounds::Unbounded { from } => from,
            _ => return OverflowStatus::Missing,
        },
        many => {
            return OverflowStatus::Multiple {
                names: many.iter().map(|p| p.name.clone()).collect(),
            }
        }
    };

    for partition in partitions.iter().filter(|p| p.attached) {
        if let PartitionBounds::Range(range) = partition.bounds {
            if range.end > boundary {
                return OverflowStatus::Breached {
                    boundary,
                    offender: partition.name.clone(),
                };
            }
        }
    }

    OverflowStatus::Healthy { boundary }
}

/// Computes the maintenance plan for one cycle.
///
/// The planner is idempotent: with unchanged inputs, a second run emits no
/// new non-skipped work, because creation is gated on catalog coverage and
/// stage advancement on the latest successful audit entry.
#[must_use]
pub fn plan(
    partitions: &[Partition],
    policy: &LifecyclePolicy,
    audit: &AuditView,
    today: NaiveDate,
) -> Vec<PlannedAction> {
    let mut actions = Vec::new();

    let status = overflow_status(partitions);
    let creation_boundary = match status {
        OverflowStatus::Healthy { boundary } => {
            if (boundary - today).num_days() < policy.creation_horizon_days {
                let new_boundary =
                    today + Days::new(day_count(2 * policy.creation_horizon_days));
                actions.push(PlannedAction::ReplaceOverflow { new_boundary });
                // Replacement executes before any creation, so creations are
                // gated on the boundary that will hold when they run.
                Some(new_boundary)
            } else {
                Some(boundary)
            }
        }
        // Invariant violation: skip dated creation, keep advancing stages.
        _ => None,
    };

    if let Some(boundary) = creation_boundary {
        plan_creations(partitions, policy, today, boundary, &mut actions);
    }

    let mut stage_actions = Vec::new();
    let mut delete_actions = Vec::new();

    let mut ordered: Vec<&Partition> = partitions.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    for partition in ordered {
        if partition.is_overflow() {
            continue;
        }
        let Some(age_days) = partition.age_days(today) else {
            // Unknown bounds: fail safe, never guess a range.
            continue;
        };

        let derived = LifecycleStage::from_age(age_days, policy);
        if derived == LifecycleStage::Active {
            continue;
        }

        // Hold a partition still being written just past the active boundary.
        if age_days <= policy.active_days + ACTIVITY_HOLD_WINDOW_DAYS
            && partition.activity.is_active()
        {
            continue;
        }

        match advancement_for(partition, derived, audit, policy, today) {
            Some(action) if action.is_delete() => delete_actions.push(action),
            Some(action) => stage_actions.push(action),
            None => {}
        }
    }

    actions.extend(stage_actions);
    actions.extend(delete_actions);
    actions
}

/// Emits creations for uncovered days within the horizon, in ascending date
/// order, bounded by the overflow boundary.
fn plan_creations(
    partitions: &[Partition],
    policy: &LifecyclePolicy,
    today: NaiveDate,
    boundary: NaiveDate,
    actions: &mut Vec<PlannedAction>,
) {
    for offset in 0..=policy.creation_horizon_days {
        let date = today + Days::new(day_count(offset));

        // Never create a dated partition at or past the catch-all boundary.
        if date >= boundary {
            continue;
        }

        // Idempotency: the day is already covered.
        if partitions
            .iter()
            .filter(|p| !p.is_overflow())
            .any(|p| p.bounds.contains(date))
        {
            continue;
        }

        let proposed = DayRange::single_day(date);
        let conflict = partitions
            .iter()
            .filter(|p| !p.is_overflow())
            .find(|p| p.bounds.overlaps(&proposed));

        match conflict {
            Some(existing) => actions.push(PlannedAction::SkippedOverlap {
                date,
                conflicting: existing.name.clone(),
            }),
            None => actions.push(PlannedAction::CreatePartition { date }),
        }
    }
}

/// Decides the next stage-advancement action for one partition, if any.
///
/// Re-planning never re-emits an action whose most recent audit entry for
/// the partition is a success for that exact stage, and stages never regress.
fn advancement_for(
    partition: &Partition,
    derived: LifecycleStage,
    audit: &AuditView,
    policy: &LifecyclePolicy,
    today: NaiveDate,
) -> Option<PlannedAction> {
    let last = audit.last_applied(&partition.name);
    let name = partition.name.clone();

    match derived {
        LifecycleStage::Archived => match last {
            None => Some(PlannedAction::Archive { partition: name }),
            Some(_) => None,
        },
        LifecycleStage::DeepArchived => match last {
            None | Some(AuditOperation::Archive) => {
                Some(PlannedAction::DeepArchive { partition: name })
            }
            Some(_) => None,
        },
        LifecycleStage::MarkedForDeletion => {
            if last == Some(AuditOperation::MarkForDeletion) {
                // Grace gating: dwell time is read from the audit log, the
                // only durable memory of when the partition was marked.
                let marked_at = audit.marked_at(&partition.name)?;
                let dwell_days = (today - marked_at.date_naive()).num_days();
                if dwell_days >= policy.deletion_grace_days {
                    let range = dated_range(partition)?;
                    Some(PlannedAction::Delete { partition: name, range })
                } else {
                    None
                }
            } else {
                // Self-healing: the mark step is never assumed to have
                // happened, even when the derived stage says it should have.
                Some(PlannedAction::MarkForDeletion { partition: name })
            }
        }
        LifecycleStage::Active | LifecycleStage::Deleted => None,
    }
}

fn dated_range(partition: &Partition) -> Option<DayRange> {
    match partition.bounds {
        PartitionBounds::Range(range) => Some(range),
        PartitionBounds::Unbounded { .. } | PartitionBounds::Unknown => None,
    }
}

/// Converts a validated non-negative day count for date arithmetic.
#[allow(clippy::cast_sign_loss)]
fn day_count(days: i64) -> u64 {
    days.max(0) as u64
}
