//! Audit log types and the planner's view of audit history.
//!
//! Every lifecycle operation attempted, successful or not, appends one
//! [`AuditLogEntry`]. Entries are immutable once written. Besides
//! observability, the log is the durable answer to "how long has partition P
//! been marked for deletion" — there is no partition-local status column.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle operation kinds recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    /// A dated partition was created.
    Create,
    /// Rows copied to the archive table, partition detached.
    Archive,
    /// Rows copied to the deep archive table.
    DeepArchive,
    /// Deletion intent recorded; no data touched.
    MarkForDeletion,
    /// Partition and its archive copies physically dropped.
    Delete,
    /// Overflow partition replaced with an advanced boundary.
    ReplaceOverflow,
}

impl AuditOperation {
    /// Stable identifier stored in the audit table.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Archive => "archive",
            Self::DeepArchive => "deep_archive",
            Self::MarkForDeletion => "mark_for_deletion",
            Self::Delete => "delete",
            Self::ReplaceOverflow => "replace_overflow",
        }
    }

    /// Parses the stored identifier back into an operation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "archive" => Some(Self::Archive),
            "deep_archive" => Some(Self::DeepArchive),
            "mark_for_deletion" => Some(Self::MarkForDeletion),
            "delete" => Some(Self::Delete),
            "replace_overflow" => Some(Self::ReplaceOverflow),
            _ => None,
        }
    }

    /// Returns true for the stage-advancement operations whose most recent
    /// successful entry makes re-planning idempotent.
    #[must_use]
    pub const fn is_stage_advancement(&self) -> bool {
        matches!(self, Self::Archive | Self::DeepArchive | Self::MarkForDeletion)
    }
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an attempted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The operation completed and committed.
    Success,
    /// The operation failed; any data-changing work was rolled back.
    Error,
    /// The operation was not applicable (already done, or conflicted).
    Skipped,
}

impl AuditStatus {
    /// Stable identifier stored in the audit table.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    /// Parses the stored identifier back into a status.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    /// The operation attempted.
    pub operation: AuditOperation,
    /// Target partition name.
    pub partition_name: String,
    /// Outcome of the attempt.
    pub status: AuditStatus,
    /// Free-form operator-facing context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Error detail for `Error` entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the entry was recorded (UTC).
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Creates a `success` entry for the given operation.
    #[must_use]
    pub fn success(operation: AuditOperation, partition_name: impl Into<String>) -> Self {
        Self::with_status(operation, partition_name, AuditStatus::Success)
    }

    /// Creates a `skipped` entry with a note explaining why.
    #[must_use]
    pub fn skipped(
        operation: AuditOperation,
        partition_name: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        let mut entry = Self::with_status(operation, partition_name, AuditStatus::Skipped);
        entry.notes = Some(notes.into());
        entry
    }

    /// Creates an `error` entry carrying the failure message.
    #[must_use]
    pub fn error(
        operation: AuditOperation,
        partition_name: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        let mut entry = Self::with_status(operation, partition_name, AuditStatus::Error);
        entry.error_message = Some(error_message.into());
        entry
    }

    fn with_status(
        operation: AuditOperation,
        partition_name: impl Into<String>,
        status: AuditStatus,
    ) -> Self {
        Self {
            operation,
            partition_name: partition_name.into(),
            status,
            notes: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    /// Attaches a note to the entry.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// The planner's projection of audit history.
///
/// Holds, per partition, the most recent successful stage-advancement
/// operation and the timestamp of the most recent successful
/// `mark_for_deletion`. Built from the audit table each cycle; tests build
/// it directly with [`AuditView::record_success`].
#[derive(Debug, Clone, Default)]
pub struct AuditView {
    last_applied: HashMap<String, AuditOperation>,
    marked_at: HashMap<String, DateTime<Utc>>,
}

impl AuditView {
    /// Creates an empty view (no history).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful operation into the view.
    ///
    /// Entries must be fed in chronological order; later entries supersede
    /// earlier ones for the same partition.
    pub fn record_success(
        &mut self,
        operation: AuditOperation,
        partition_name: &str,
        at: DateTime<Utc>,
    ) {
        if operation.is_stage_advancement() {
            self.last_applied
                .insert(partition_name.to_string(), operation);
        }
        if operation == AuditOperation::MarkForDeletion {
            self.marked_at.insert(partition_name.to_string(), at);
        }
    }

    /// Most recent successfully applied stage operation for a partition.
    #[must_use]
    pub fn last_applied(&self, partition_name: &str) -> Option<AuditOperation> {
        self.last_applied.get(partition_name).copied()
    }

    /// When the partition was last successfully marked for deletion.
    ///
    /// Operational note: this is the only durable memory of the deletion
    /// grace period. Pruning or rotating the audit table resets the clock
    /// for partitions that were already marked.
    #[must_use]
    pub fn marked_at(&self, partition_name: &str) -> Option<DateTime<Utc>> {
        self.marked_at.get(partition_name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_identifiers_roundtrip() {
        for op in [
            AuditOperation::Create,
            AuditOperation::Archive,
            AuditOperation::DeepArchive,
            AuditOperation::MarkForDeletion,
            AuditOperation::Delete,
            AuditOperation::ReplaceOverflow,
        ] {
            assert_eq!(AuditOperation::parse(op.as_str()), Some(op));
        }
        assert_eq!(AuditOperation::parse("vacuum"), None);
    }

    #[test]
    fn test_status_identifiers_roundtrip() {
        for status in [AuditStatus::Success, AuditStatus::Error, AuditStatus::Skipped] {
            assert_eq!(AuditStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_entry_constructors() {
        let entry = AuditLogEntry::error(
            AuditOperation::Delete,
            "ledger_entries_p20230101",
            "no snapshot",
        );
        assert_eq!(entry.status, AuditStatus::Error);
        assert_eq!(entry.error_message.as_deref(), Some("no snapshot"));

        let entry = AuditLogEntry::skipped(
            AuditOperation::Create,
            "ledger_entries_p20250115",
            "relation already exists",
        );
        assert_eq!(entry.status, AuditStatus::Skipped);
        assert!(entry.error_message.is_none());
    }

    #[test]
    fn test_view_tracks_latest_stage() {
        let mut view = AuditView::new();
        let t0 = Utc::now();
        view.record_success(AuditOperation::Archive, "p1", t0);
        assert_eq!(view.last_applied("p1"), Some(AuditOperation::Archive));

        view.record_success(AuditOperation::DeepArchive, "p1", t0);
        assert_eq!(view.last_applied("p1"), Some(AuditOperation::DeepArchive));

        // Create/delete are not stage advancements.
        view.record_success(AuditOperation::Create, "p2", t0);
        assert_eq!(view.last_applied("p2"), None);
    }

    #[test]
    fn test_view_marked_at() {
        let mut view = AuditView::new();
        let t0 = Utc::now();
        view.record_success(AuditOperation::MarkForDeletion, "p1", t0);
        assert_eq!(view.marked_at("p1"), Some(t0));
        assert_eq!(view.last_applied("p1"), Some(AuditOperation::MarkForDeletion));
        assert_eq!(view.marked_at("p2"), None);
    }
}
