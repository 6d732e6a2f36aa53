//! Pure SQL statement builders.
//!
//! Every DDL/DML statement the executor issues is built here from typed
//! inputs, with identifiers quoted, so statement shapes are testable without
//! a database. Nothing in this module performs I/O.

use chrono::NaiveDate;

use ledgerpart_core::bounds::DayRange;

/// Parent ledger table that all partitions belong to.
pub const LEDGER_TABLE: &str = "ledger_entries";

/// Secondary indexes created on every partition: (suffix, column).
const PARTITION_INDEXES: [(&str, &str); 3] = [
    ("account", "account_id"),
    ("event_type", "event_type"),
    ("event_at", "event_at"),
];

/// Quotes a `PostgreSQL` identifier, doubling embedded quotes.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_date(date: NaiveDate) -> String {
    format!("'{}'", date.format("%Y-%m-%d"))
}

/// Name of the archive copy for a dated partition.
#[must_use]
pub fn archive_table_name(partition: &str) -> String {
    format!("ledger_archive_{}", suffix(partition))
}

/// Name of the deep archive copy for a dated partition.
#[must_use]
pub fn deep_archive_table_name(partition: &str) -> String {
    format!("ledger_deep_archive_{}", suffix(partition))
}

/// The date-encoding suffix of a partition name (`p20250115`). Archive
/// tables deliberately do not share the partition prefix, so the catalog
/// reader never mistakes them for detached partitions.
fn suffix(partition: &str) -> &str {
    partition
        .strip_prefix("ledger_entries_")
        .unwrap_or(partition)
}

/// Takes the partition-keyed advisory lock for the current transaction.
///
/// `pg_advisory_xact_lock` is released on commit or rollback, so a crashed
/// holder can never leak the lock to the next cycle.
#[must_use]
pub fn advisory_lock_stmt() -> &'static str {
    "SELECT pg_advisory_xact_lock(hashtext($1))"
}

/// `CREATE TABLE ... PARTITION OF ...` for one dated day range.
#[must_use]
pub fn create_partition_stmt(partition: &str, range: DayRange) -> String {
    format!(
        "CREATE TABLE {} PARTITION OF {} FOR VALUES FROM ({}) TO ({})",
        quote_ident(partition),
        quote_ident(LEDGER_TABLE),
        quote_date(range.start),
        quote_date(range.end),
    )
}

/// Creates the overflow partition `[boundary, +∞)`.
#[must_use]
pub fn create_overflow_stmt(name: &str, boundary: NaiveDate) -> String {
    format!(
        "CREATE TABLE {} PARTITION OF {} FOR VALUES FROM ({}) TO (MAXVALUE)",
        quote_ident(name),
        quote_ident(LEDGER_TABLE),
        quote_date(boundary),
    )
}

/// Secondary index statements for a partition (account, event type,
/// timestamp).
#[must_use]
pub fn create_index_stmts(partition: &str) -> Vec<String> {
    PARTITION_INDEXES
        .iter()
        .map(|(index_suffix, column)| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&format!("idx_{partition}_{index_suffix}")),
                quote_ident(partition),
                quote_ident(column),
            )
        })
        .collect()
}

/// Creates an archive table shaped like the parent, if absent.
#[must_use]
pub fn create_archive_stmt(archive: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (LIKE {} INCLUDING ALL)",
        quote_ident(archive),
        quote_ident(LEDGER_TABLE),
    )
}

/// Copies every row of `source` into `target`.
///
/// Conflicting rows are left alone: the archive table inherits the parent's
/// primary key through `LIKE ... INCLUDING ALL`, so replaying the copy after
/// an interrupted earlier attempt never duplicates rows.
#[must_use]
pub fn copy_rows_stmt(source: &str, target: &str) -> String {
    format!(
        "INSERT INTO {} SELECT * FROM {} ON CONFLICT DO NOTHING",
        quote_ident(target),
        quote_ident(source),
    )
}

/// Detaches a partition from the parent table.
#[must_use]
pub fn detach_partition_stmt(partition: &str) -> String {
    format!(
        "ALTER TABLE {} DETACH PARTITION {}",
        quote_ident(LEDGER_TABLE),
        quote_ident(partition),
    )
}

/// Renames a table (used to park the old overflow during replacement).
#[must_use]
pub fn rename_table_stmt(from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME TO {}",
        quote_ident(from),
        quote_ident(to),
    )
}

/// Drops a table if it exists.
#[must_use]
pub fn drop_table_stmt(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table))
}

/// Re-routes rows from a parked table through the parent, so they land in
/// whichever partition now covers their timestamp.
#[must_use]
pub fn reinsert_through_parent_stmt(source: &str) -> String {
    format!(
        "INSERT INTO {} SELECT * FROM {}",
        quote_ident(LEDGER_TABLE),
        quote_ident(source),
    )
}

/// True if a relation with this name exists (`to_regclass` is null-safe).
#[must_use]
pub fn relation_exists_stmt() -> &'static str {
    "SELECT to_regclass($1) IS NOT NULL"
}

/// True if the named relation is currently attached to the ledger parent.
#[must_use]
pub fn is_attached_stmt() -> &'static str {
    "SELECT EXISTS (
        SELECT 1
        FROM pg_inherits i
        JOIN pg_class c ON c.oid = i.inhrelid
        JOIN pg_class p ON p.oid = i.inhparent
        WHERE c.relname = $1 AND p.relname = $2
    )"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_quote_ident_doubles_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_create_partition_stmt() {
        let range = DayRange::single_day(d("2025-01-15"));
        assert_eq!(
            create_partition_stmt("ledger_entries_p20250115", range),
            "CREATE TABLE \"ledger_entries_p20250115\" PARTITION OF \"ledger_entries\" \
             FOR VALUES FROM ('2025-01-15') TO ('2025-01-16')"
        );
    }

    #[test]
    fn test_create_overflow_stmt() {
        assert_eq!(
            create_overflow_stmt("ledger_entries_overflow", d("2025-02-01")),
            "CREATE TABLE \"ledger_entries_overflow\" PARTITION OF \"ledger_entries\" \
             FOR VALUES FROM ('2025-02-01') TO (MAXVALUE)"
        );
    }

    #[test]
    fn test_index_stmts_cover_all_three_columns() {
        let stmts = create_index_stmts("ledger_entries_p20250115");
        assert_eq!(stmts.len(), 3);
        assert!(stmts[0].contains("(\"account_id\")"));
        assert!(stmts[1].contains("(\"event_type\")"));
        assert!(stmts[2].contains("(\"event_at\")"));
        assert!(stmts.iter().all(|s| s.starts_with("CREATE INDEX IF NOT EXISTS")));
    }

    #[test]
    fn test_archive_names_do_not_share_partition_prefix() {
        let archive = archive_table_name("ledger_entries_p20250115");
        let deep = deep_archive_table_name("ledger_entries_p20250115");
        assert_eq!(archive, "ledger_archive_p20250115");
        assert_eq!(deep, "ledger_deep_archive_p20250115");
        assert!(!archive.starts_with("ledger_entries_p"));
        assert!(!deep.starts_with("ledger_entries_p"));
    }

    #[test]
    fn test_copy_tolerates_replay() {
        // An archive copy that already ran partway must be safe to repeat.
        assert_eq!(
            copy_rows_stmt("ledger_entries_p20240601", "ledger_archive_p20240601"),
            "INSERT INTO \"ledger_archive_p20240601\" \
             SELECT * FROM \"ledger_entries_p20240601\" ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn test_detach_and_drop() {
        assert_eq!(
            detach_partition_stmt("ledger_entries_p20230101"),
            "ALTER TABLE \"ledger_entries\" DETACH PARTITION \"ledger_entries_p20230101\""
        );
        assert_eq!(
            drop_table_stmt("ledger_archive_p20230101"),
            "DROP TABLE IF EXISTS \"ledger_archive_p20230101\""
        );
    }
}
