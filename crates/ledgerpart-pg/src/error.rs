//! Error types for the `PostgreSQL` integration layer.

use thiserror::Error;

/// Result type alias for lifecycle database operations.
pub type Result<T> = std::result::Result<T, PgError>;

/// SQLSTATE codes treated as transient: serialization failure, deadlock
/// detected, lock not available, query canceled (statement timeout).
const TRANSIENT_SQLSTATES: [&str; 4] = ["40001", "40P01", "55P03", "57014"];

/// Errors from the lifecycle manager's database operations.
#[derive(Debug, Error)]
pub enum PgError {
    /// The database driver reported an error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Catalog introspection returned something uninterpretable.
    #[error("catalog error: {message}")]
    Catalog {
        /// Description of the catalog problem.
        message: String,
    },

    /// The deletion precondition failed: no snapshot covers the partition's
    /// range. Deletion fails closed and is re-evaluated next cycle.
    #[error("no snapshot covers {partition}; refusing to delete")]
    SnapshotMissing {
        /// Partition whose deletion was refused.
        partition: String,
    },

    /// An audit row referenced an operation or status this build does not
    /// know. The log is append-only, so this indicates version skew.
    #[error("unrecognized audit row: {message}")]
    AuditDecode {
        /// Description of the undecodable value.
        message: String,
    },
}

impl PgError {
    /// Returns true if the error is worth retrying with backoff.
    ///
    /// Planning conflicts and precondition failures are never transient;
    /// only infrastructure-level failures (connection loss, pool timeout,
    /// lock/serialization SQLSTATEs) qualify.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        let Self::Database(err) = self else {
            return false;
        };
        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
            sqlx::Error::Database(db) => db
                .code()
                .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref())),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_not_transient() {
        let err = PgError::SnapshotMissing {
            partition: "ledger_entries_p20230101".to_string(),
        };
        assert!(!err.is_transient());

        let err = PgError::Catalog {
            message: "unparsable bound".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        let err = PgError::Database(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
    }

    #[test]
    fn test_row_not_found_is_not_transient() {
        let err = PgError::Database(sqlx::Error::RowNotFound);
        assert!(!err.is_transient());
    }
}
