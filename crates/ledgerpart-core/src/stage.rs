//! Lifecycle stage derivation.
//!
//! A partition's stage is never persisted. It is recomputed from the
//! partition's age against the policy thresholds, which keeps the catalog the
//! single source of truth (the one exception, deletion gating, reads the
//! audit log and is handled by the planner).

use serde::{Deserialize, Serialize};

use crate::policy::LifecyclePolicy;

/// Lifecycle classification of a partition, derived from age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStage {
    /// In the live write window; default scan path.
    Active,
    /// Copied to the archive table and detached from the parent.
    Archived,
    /// Copied to the deep archive table.
    DeepArchived,
    /// On the deletion path, awaiting the grace period.
    MarkedForDeletion,
    /// Physically dropped. Terminal; partitions are never resurrected.
    Deleted,
}

impl LifecycleStage {
    /// Derives the stage implied by a partition's age in days.
    ///
    /// Thresholds are cumulative: archived above `active_days`, deep
    /// archived above `archive_days`, on the deletion path from
    /// `delete_threshold_days`. `Deleted` is never derived from age; it
    /// requires an explicit, audited deletion action.
    #[must_use]
    pub const fn from_age(age_days: i64, policy: &LifecyclePolicy) -> Self {
        if age_days >= policy.delete_threshold_days {
            Self::MarkedForDeletion
        } else if age_days > policy.archive_days {
            Self::DeepArchived
        } else if age_days > policy.active_days {
            Self::Archived
        } else {
            Self::Active
        }
    }

    /// Lowercase identifier used in logs and audit notes.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::DeepArchived => "deep_archived",
            Self::MarkedForDeletion => "marked_for_deletion",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
