//! # pg-partition
//!
//! Application-level table partitioning for PostgreSQL.
//!
//! A logical "parent" table is split into many physical child tables, each
//! constrained to a disjoint slice of key space. This library provides:
//!
//! - **Key strategies** (modulo, hashed modulo, text, time buckets) that
//!   reduce raw key values to stable partition identifiers
//! - **Deterministic naming** of partition schemas, tables, and aliases
//! - **Lifecycle DDL**: creating, indexing, constraining, archiving, and
//!   dropping partitions, individually or over a range
//! - **Statement routing** that rewrites insert/update/delete/select
//!   operations onto the correct physical partition, with primary-key
//!   prefetching
//!
//! The relational engine itself is an external collaborator behind the
//! traits in [`engine`]; the core owns no connections or transactions.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pg_partition::{PartitionCatalog, PartitionSpec};
//!
//! # fn main() -> pg_partition::Result<()> {
//! let spec = Arc::new(
//!     PartitionSpec::builder("employees")
//!         .on("company_id")
//!         .modulo(96)
//!         .build()?,
//! );
//!
//! let catalog = PartitionCatalog::new();
//! let identity = catalog.resolve(&spec, &[42i64.into()])?;
//! assert_eq!(identity.qualified_name(), "employees_partitions.p42");
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod manager;
pub mod router;

// Re-exports for convenient access
pub use catalog::{PartitionCatalog, TableIdentity};
pub use config::{ForeignKeySpec, IndexSpec, PartitionSpec, PartitionSpecBuilder, RetentionPolicy};
pub use core::{NormalizedKey, PartitionKeyStrategy, PartitionRange, SqlValue, TimeGranularity};
pub use error::{PartitionError, Result};
pub use manager::{PartitionManager, ProvisionOptions, ProvisionReport, SweepReport};
pub use router::StatementRouter;
