//! The in-memory partition model reconstructed from the catalog each cycle.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::bounds::PartitionBounds;

/// Prefix shared by every partition of the ledger table.
pub const PARTITION_PREFIX: &str = "ledger_entries_p";

/// Name of the catch-all overflow partition.
pub const OVERFLOW_PARTITION: &str = "ledger_entries_overflow";

/// Write-path activity counters for one partition, from the database's
/// per-table statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteActivity {
    /// Rows inserted since stats reset.
    pub inserts: i64,
    /// Rows updated since stats reset.
    pub updates: i64,
    /// Rows deleted since stats reset.
    pub deletes: i64,
}

impl WriteActivity {
    /// Returns true if the partition shows any write-path activity.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.inserts > 0 || self.updates > 0 || self.deletes > 0
    }
}

/// A partition of the ledger table as observed in the catalog.
///
/// Partitions are never stored as first-class rows; this struct is rebuilt
/// from catalog introspection on every maintenance cycle. Detached
/// partitions (already archived) still appear here with `attached = false`
/// so the planner can advance them toward deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    /// Relation name; dated partitions encode the covered start date.
    pub name: String,
    /// Typed bounds, or `Unknown` if the bound expression was unparsable.
    pub bounds: PartitionBounds,
    /// Whether the relation is currently attached to the parent table.
    pub attached: bool,
    /// Write-path counters used for the activity hold-back check.
    pub activity: WriteActivity,
}

impl Partition {
    /// Partition age in days: `today - start_date`.
    ///
    /// Returns `None` for partitions with unknown bounds.
    #[must_use]
    pub fn age_days(&self, today: NaiveDate) -> Option<i64> {
        self.bounds.start().map(|start| (today - start).num_days())
    }

    /// Returns true if this is the catch-all overflow partition.
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        matches!(self.bounds, PartitionBounds::Unbounded { .. })
    }
}

/// Returns the canonical name for the dated partition starting at `date`.
#[must_use]
pub fn partition_name(date: NaiveDate) -> String {
    format!("{PARTITION_PREFIX}{}", date.format("%Y%m%d"))
}

/// Recovers the start date encoded in a dated partition name.
///
/// Used for tables that have already been detached: after `DETACH PARTITION`
/// the catalog no longer carries a bound expression, but the name still
/// identifies the day the partition covers.
#[must_use]
pub fn date_from_name(name: &str) -> Option<NaiveDate> {
    let digits = name.strip_prefix(PARTITION_PREFIX)?;
    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::DayRange;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_partition_name_roundtrip() {
        let date = d("2025-01-15");
        let name = partition_name(date);
        assert_eq!(name, "ledger_entries_p20250115");
        assert_eq!(date_from_name(&name), Some(date));
    }

    #[test]
    fn test_date_from_name_rejects_foreign_tables() {
        assert_eq!(date_from_name("ledger_entries_overflow"), None);
        assert_eq!(date_from_name("ledger_entries_p2025011"), None);
        assert_eq!(date_from_name("other_table_p20250115"), None);
    }

    #[test]
    fn test_age_days() {
        let partition = Partition {
            name: partition_name(d("2025-01-10")),
            bounds: PartitionBounds::Range(DayRange::single_day(d("2025-01-10"))),
            attached: true,
            activity: WriteActivity::default(),
        };
        assert_eq!(partition.age_days(d("2025-01-15")), Some(5));
    }

    #[test]
    fn test_age_days_unknown_bounds() {
        let partition = Partition {
            name: "ledger_entries_pmystery".to_string(),
            bounds: PartitionBounds::Unknown,
            attached: true,
            activity: WriteActivity::default(),
        };
        assert_eq!(partition.age_days(d("2025-01-15")), None);
    }

    #[test]
    fn test_write_activity() {
        assert!(!WriteActivity::default().is_active());
        assert!(WriteActivity { inserts: 1, ..Default::default() }.is_active());
        assert!(WriteActivity { deletes: 3, ..Default::default() }.is_active());
    }
}
