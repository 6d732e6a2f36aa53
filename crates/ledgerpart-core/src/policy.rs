//! Lifecycle policy configuration.

use serde::{Deserialize, Serialize};

/// Lifecycle policy for ledger partitions.
///
/// Thresholds are cumulative day boundaries on partition age: a partition is
/// active through `active_days`, archived through `archive_days`, then deep
/// archived until it reaches `delete_threshold_days` and enters the deletion
/// path. Physical deletion is additionally gated by `deletion_grace_days` of
/// dwell time in the marked state.
///
/// # Example
///
/// ```rust
/// use ledgerpart_core::policy::LifecyclePolicy;
///
/// // Use defaults
/// let policy = LifecyclePolicy::default();
///
/// // Or customize
/// let policy = LifecyclePolicy {
///     active_days: 90,
///     archive_days: 365,
///     deep_archive_days: 730,
///     delete_threshold_days: 731,
///     deletion_grace_days: 7,
///     creation_horizon_days: 5,
/// };
/// assert!(policy.validate().is_none());
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LifecyclePolicy {
    /// Age (days) through which a partition stays fully active.
    pub active_days: i64,

    /// Age (days) through which a partition stays in the archive stage.
    pub archive_days: i64,

    /// Age (days) marking the nominal deep-archive point. Validation pins it
    /// between `archive_days` and `delete_threshold_days`; stage derivation
    /// keeps a partition deep-archived until `delete_threshold_days`.
    pub deep_archive_days: i64,

    /// Age (days) at which a partition enters the deletion path.
    pub delete_threshold_days: i64,

    /// Minimum dwell time (days) in the marked-for-deletion state before
    /// physical deletion is permitted.
    pub deletion_grace_days: i64,

    /// How many days ahead of today dated partitions must already exist.
    pub creation_horizon_days: i64,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            active_days: 90,
            archive_days: 365,
            deep_archive_days: 730,
            delete_threshold_days: 731,
            deletion_grace_days: 7,
            creation_horizon_days: 5,
        }
    }
}

impl LifecyclePolicy {
    /// Creates a policy suitable for development/testing with short windows.
    ///
    /// - 2 days active, archived at 5, deep archived at 10
    /// - deletion path from day 11, 1 day grace
    /// - 3 day creation horizon
    #[must_use]
    pub const fn development() -> Self {
        Self {
            active_days: 2,
            archive_days: 5,
            deep_archive_days: 10,
            delete_threshold_days: 11,
            deletion_grace_days: 1,
            creation_horizon_days: 3,
        }
    }

    /// Validates that the policy is internally consistent.
    ///
    /// Returns an error message if validation fails.
    #[must_use]
    pub fn validate(&self) -> Option<String> {
        if self.active_days < 1 {
            return Some("active_days must be at least 1".to_string());
        }
        if self.archive_days <= self.active_days {
            return Some(format!(
                "archive_days ({}) must exceed active_days ({})",
                self.archive_days, self.active_days
            ));
        }
        if self.deep_archive_days <= self.archive_days {
            return Some(format!(
                "deep_archive_days ({}) must exceed archive_days ({})",
                self.deep_archive_days, self.archive_days
            ));
        }
        if self.delete_threshold_days <= self.deep_archive_days {
            return Some(format!(
                "delete_threshold_days ({}) must exceed deep_archive_days ({})",
                self.delete_threshold_days, self.deep_archive_days
            ));
        }
        if self.deletion_grace_days < 1 {
            return Some("deletion_grace_days must be at least 1".to_string());
        }
        if self.creation_horizon_days < 1 {
            return Some("creation_horizon_days must be at least 1".to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        assert!(LifecyclePolicy::default().validate().is_none());
    }

    #[test]
    fn test_development_policy_is_valid() {
        assert!(LifecyclePolicy::development().validate().is_none());
    }

    #[test]
    fn test_validation_rejects_inverted_thresholds() {
        let policy = LifecyclePolicy {
            archive_days: 30,
            active_days: 90,
            ..Default::default()
        };
        assert!(policy.validate().is_some());
    }

    #[test]
    fn test_validation_rejects_zero_grace() {
        let policy = LifecyclePolicy {
            deletion_grace_days: 0,
            ..Default::default()
        };
        assert!(policy.validate().is_some());
    }

    #[test]
    fn test_validation_rejects_zero_horizon() {
        let policy = LifecyclePolicy {
            creation_horizon_days: 0,
            ..Default::default()
        };
        assert!(policy.validate().is_some());
    }

    #[test]
    fn test_serde_roundtrip() {
        let policy = LifecyclePolicy::default();
        let json = serde_json::to_string(&policy).expect("serialize");
        let parsed: LifecyclePolicy = serde_json::from_str(&json).expect("parse");
        assert_eq!(policy, parsed);
    }
}
