//! # ledgerpart-pg
//!
//! `PostgreSQL` integration for the ledger partition lifecycle manager:
//!
//! - **Catalog reader**: reconstructs the partition set from the system
//!   catalog each cycle (attached children via `pg_inherits`, detached
//!   archive-stage tables by naming convention, write activity from
//!   `pg_stat_user_tables`)
//! - **Audit store**: the append-only `partition_audit_log` table and the
//!   planner's [`ledgerpart_core::AuditView`] built from it
//! - **Executor**: applies one planned action per transaction, guarded by a
//!   partition-keyed advisory lock, with bounded retries for transient
//!   failures; the success audit row commits inside the action transaction,
//!   while failed attempts are audited on a connection that survives the
//!   rollback
//! - **Overflow guard**: checks the catch-all partition invariant before any
//!   dated-partition work
//! - **Snapshot seam**: the [`SnapshotStore`] trait the delete path consults
//!   before dropping anything
//!
//! All SQL text is produced by pure builders in [`sql`], so statement shapes
//! are unit-tested without a database.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod audit_store;
pub mod catalog;
pub mod error;
pub mod executor;
pub mod overflow;
pub mod snapshot;
pub mod sql;

pub use audit_store::AuditStore;
pub use catalog::CatalogReader;
pub use error::{PgError, Result};
pub use executor::PartitionExecutor;
pub use overflow::OverflowGuard;
pub use snapshot::{PgSnapshotStore, SnapshotStore};
