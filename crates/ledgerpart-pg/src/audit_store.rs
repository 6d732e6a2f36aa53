//! The append-only audit log table.
//!
//! Every lifecycle attempt is recorded here, successful or not. The table is
//! never updated or deleted from — this module deliberately contains no
//! UPDATE or DELETE statement. Besides observability, the log is the durable
//! memory behind deletion grace periods (see
//! [`ledgerpart_core::AuditView::marked_at`]).

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPool};
use sqlx::query::Query;
use sqlx::{Postgres, Row, Transaction};

use ledgerpart_core::audit::{AuditLogEntry, AuditOperation, AuditStatus, AuditView};

use crate::error::{PgError, Result};

/// Audit table schema (embedded).
const AUDIT_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS partition_audit_log (
        id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        operation_type TEXT NOT NULL,
        partition_name TEXT NOT NULL,
        status TEXT NOT NULL,
        notes TEXT,
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    CREATE INDEX IF NOT EXISTS idx_partition_audit_log_operation
        ON partition_audit_log (operation_type);
    CREATE INDEX IF NOT EXISTS idx_partition_audit_log_partition
        ON partition_audit_log (partition_name);
    CREATE INDEX IF NOT EXISTS idx_partition_audit_log_status
        ON partition_audit_log (status);
    CREATE INDEX IF NOT EXISTS idx_partition_audit_log_created_at
        ON partition_audit_log (created_at);
";

/// Successful entries in chronological order, for rebuilding the planner's
/// view. Ties on `created_at` are broken by insertion order.
const VIEW_QUERY: &str = "
    SELECT operation_type, partition_name, created_at
    FROM partition_audit_log
    WHERE status = 'success'
    ORDER BY created_at ASC, id ASC
";

const RECENT_QUERY: &str = "
    SELECT operation_type, partition_name, status, notes, error_message, created_at
    FROM partition_audit_log
    ORDER BY created_at DESC, id DESC
    LIMIT $1
";

const INSERT_QUERY: &str = "
    INSERT INTO partition_audit_log
        (operation_type, partition_name, status, notes, error_message, created_at)
    VALUES ($1, $2, $3, $4, $5, $6)
";

/// Append-only store over `partition_audit_log`.
#[derive(Clone)]
pub struct AuditStore {
    pool: PgPool,
}

impl AuditStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the audit table and its indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if any schema statement fails.
    pub async fn migrate(&self) -> Result<()> {
        for statement in schema_statements(AUDIT_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("audit log schema ensured");
        Ok(())
    }

    /// Appends one audit entry.
    ///
    /// Runs on its own connection, outside any executor transaction, so the
    /// record survives rollback of the data-changing work it describes. Used
    /// for error and skipped entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        insert_entry(entry).execute(&self.pool).await?;
        Ok(())
    }

    /// Appends one audit entry inside the caller's transaction.
    ///
    /// Used for success entries: the record must become durable atomically
    /// with the data change it describes. A commit that lost its success row
    /// would make the next cycle re-plan work that already happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails; the caller's transaction rolls
    /// back with it.
    pub async fn append_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry: &AuditLogEntry,
    ) -> Result<()> {
        insert_entry(entry).execute(&mut **tx).await?;
        Ok(())
    }

    /// Rebuilds the planner's audit view from durable history.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row holds an operation this
    /// build does not recognize.
    pub async fn load_view(&self) -> Result<AuditView> {
        let rows = sqlx::query(VIEW_QUERY).fetch_all(&self.pool).await?;

        let mut view = AuditView::new();
        for row in rows {
            let operation_raw: String = row.get("operation_type");
            let partition_name: String = row.get("partition_name");
            let created_at: DateTime<Utc> = row.get("created_at");

            let operation =
                AuditOperation::parse(&operation_raw).ok_or_else(|| PgError::AuditDecode {
                    message: format!("unknown operation_type '{operation_raw}'"),
                })?;
            view.record_success(operation, &partition_name, created_at);
        }
        Ok(view)
    }

    /// Most recent audit entries, newest first, for operator inspection.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        let rows = sqlx::query(RECENT_QUERY)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let operation_raw: String = row.get("operation_type");
                let status_raw: String = row.get("status");
                let operation =
                    AuditOperation::parse(&operation_raw).ok_or_else(|| PgError::AuditDecode {
                        message: format!("unknown operation_type '{operation_raw}'"),
                    })?;
                let status =
                    AuditStatus::parse(&status_raw).ok_or_else(|| PgError::AuditDecode {
                        message: format!("unknown status '{status_raw}'"),
                    })?;
                Ok(AuditLogEntry {
                    operation,
                    partition_name: row.get("partition_name"),
                    status,
                    notes: row.get("notes"),
                    error_message: row.get("error_message"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}

fn insert_entry(entry: &AuditLogEntry) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(INSERT_QUERY)
        .bind(entry.operation.as_str())
        .bind(&entry.partition_name)
        .bind(entry.status.as_str())
        .bind(entry.notes.as_deref())
        .bind(entry.error_message.as_deref())
        .bind(entry.created_at)
}

/// Splits an embedded schema into individual statements, dropping comments
/// and blanks.
fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_splits_into_statements() {
        let statements = schema_statements(AUDIT_SCHEMA);
        assert_eq!(statements.len(), 5);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS partition_audit_log"));
        assert!(statements[1..]
            .iter()
            .all(|s| s.starts_with("CREATE INDEX IF NOT EXISTS")));
    }

    #[test]
    fn test_store_has_no_mutating_statements() {
        // The audit log is append-only: the store must never update or
        // delete what it has written.
        for query in [VIEW_QUERY, RECENT_QUERY, INSERT_QUERY, AUDIT_SCHEMA] {
            assert!(!query.contains("UPDATE"));
            assert!(!query.contains("DELETE"));
        }
    }
}
