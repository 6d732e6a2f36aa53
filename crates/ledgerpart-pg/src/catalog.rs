//! Catalog introspection: rebuilding the partition set each cycle.

use sqlx::postgres::PgPool;
use sqlx::Row;

use ledgerpart_core::bounds::{parse_partition_bounds, DayRange, PartitionBounds};
use ledgerpart_core::partition::{date_from_name, Partition, WriteActivity, PARTITION_PREFIX};

use crate::error::Result;
use crate::sql::LEDGER_TABLE;

/// Attached children of the ledger parent, with their bound expressions and
/// write-activity counters.
const ATTACHED_PARTITIONS_QUERY: &str = "
    SELECT c.relname AS name,
           pg_get_expr(c.relpartbound, c.oid) AS bound_expr,
           COALESCE(s.n_tup_ins, 0) AS inserts,
           COALESCE(s.n_tup_upd, 0) AS updates,
           COALESCE(s.n_tup_del, 0) AS deletes
    FROM pg_inherits i
    JOIN pg_class c ON c.oid = i.inhrelid
    JOIN pg_class p ON p.oid = i.inhparent
    LEFT JOIN pg_stat_user_tables s ON s.relid = c.oid
    WHERE p.relname = $1
    ORDER BY c.relname
";

/// Plain tables matching the dated-partition prefix that are no longer
/// attached anywhere: these are archived partitions awaiting deletion.
const DETACHED_CANDIDATES_QUERY: &str = "
    SELECT c.relname AS name
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE c.relkind = 'r'
      AND n.nspname = current_schema()
      AND c.relname LIKE $1
      AND NOT EXISTS (SELECT 1 FROM pg_inherits i WHERE i.inhrelid = c.oid)
    ORDER BY c.relname
";

/// Reads the partition set of the ledger table from the system catalog.
///
/// The reader never aborts on a single malformed partition: an unparsable
/// bound expression is reported and the partition is returned with
/// [`PartitionBounds::Unknown`], which the planner skips.
pub struct CatalogReader {
    pool: PgPool,
}

impl CatalogReader {
    /// Creates a reader over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lists all partitions of the ledger table: attached children plus
    /// detached dated tables still awaiting the rest of their lifecycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog queries themselves fail. Per-partition
    /// parse problems never fail the scan.
    pub async fn list_partitions(&self) -> Result<Vec<Partition>> {
        let mut partitions = self.attached_partitions().await?;
        partitions.extend(self.detached_partitions().await?);
        Ok(partitions)
    }

    async fn attached_partitions(&self) -> Result<Vec<Partition>> {
        let rows = sqlx::query(ATTACHED_PARTITIONS_QUERY)
            .bind(LEDGER_TABLE)
            .fetch_all(&self.pool)
            .await?;

        let mut partitions = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get("name");
            let bound_expr: Option<String> = row.get("bound_expr");

            let bounds = match bound_expr.as_deref() {
                Some(expr) => match parse_partition_bounds(expr) {
                    Ok(bounds) => bounds,
                    Err(err) => {
                        tracing::warn!(
                            partition = %name,
                            bound_expr = %expr,
                            error = %err,
                            "unparsable partition bound expression; treating range as unknown"
                        );
                        PartitionBounds::Unknown
                    }
                },
                None => {
                    tracing::warn!(
                        partition = %name,
                        "attached child has no bound expression; treating range as unknown"
                    );
                    PartitionBounds::Unknown
                }
            };

            partitions.push(Partition {
                name,
                bounds,
                attached: true,
                activity: WriteActivity {
                    inserts: row.get("inserts"),
                    updates: row.get("updates"),
                    deletes: row.get("deletes"),
                },
            });
        }
        Ok(partitions)
    }

    async fn detached_partitions(&self) -> Result<Vec<Partition>> {
        let pattern = format!("{}%", PARTITION_PREFIX.replace('_', "\\_"));
        let rows = sqlx::query(DETACHED_CANDIDATES_QUERY)
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await?;

        let mut partitions = Vec::new();
        for row in rows {
            let name: String = row.get("name");
            // Detached tables carry no bound expression; the start date is
            // recovered from the name this system assigned at creation.
            let Some(start) = date_from_name(&name) else {
                tracing::warn!(
                    table = %name,
                    "table matches the partition prefix but encodes no date; ignoring"
                );
                continue;
            };
            partitions.push(Partition {
                name,
                bounds: PartitionBounds::Range(DayRange::single_day(start)),
                attached: false,
                activity: WriteActivity::default(),
            });
        }
        Ok(partitions)
    }
}
