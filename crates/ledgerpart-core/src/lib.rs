//! # ledgerpart-core
//!
//! Pure domain logic for the ledger partition lifecycle manager.
//!
//! The ledger table is range-partitioned by day. This crate models those
//! partitions and decides what maintenance they need next, without touching
//! a database:
//!
//! - **Bounds**: typed `[start, end)` day ranges parsed from `PostgreSQL`
//!   partition bound expressions
//! - **Policy**: age thresholds that map partition age to a lifecycle stage,
//!   plus the deletion grace period and creation horizon
//! - **Stage derivation**: pure age-to-stage classification
//! - **Audit view**: a projection of the append-only audit log used to make
//!   planning idempotent and to gate deletion on the grace period
//! - **Planner**: computes the ordered list of actions for one maintenance
//!   cycle (create / archive / deep-archive / mark / delete / replace
//!   overflow)
//!
//! Everything here is deterministic given `(partitions, policy, audit, today)`,
//! which is what makes the lifecycle testable without a live catalog.
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use ledgerpart_core::audit::AuditView;
//! use ledgerpart_core::bounds::PartitionBounds;
//! use ledgerpart_core::partition::{Partition, WriteActivity, OVERFLOW_PARTITION};
//! use ledgerpart_core::plan::plan;
//! use ledgerpart_core::policy::LifecyclePolicy;
//!
//! let today = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
//! let overflow = Partition {
//!     name: OVERFLOW_PARTITION.to_string(),
//!     bounds: PartitionBounds::Unbounded {
//!         from: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
//!     },
//!     attached: true,
//!     activity: WriteActivity::default(),
//! };
//!
//! // No dated partitions exist yet: the planner asks for the full horizon.
//! let actions = plan(&[overflow], &LifecyclePolicy::default(), &AuditView::new(), today);
//! assert_eq!(actions.len(), 6); // today ..= today + 5
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod bounds;
pub mod partition;
pub mod plan;
pub mod policy;
pub mod stage;

pub use audit::{AuditLogEntry, AuditOperation, AuditStatus, AuditView};
pub use bounds::{BoundsParseError, DayRange, PartitionBounds};
pub use partition::{Partition, WriteActivity};
pub use plan::{plan, OverflowStatus, PlannedAction};
pub use policy::LifecyclePolicy;
pub use stage::LifecycleStage;
