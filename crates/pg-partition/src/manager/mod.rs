//! Partition lifecycle administration.
//!
//! [`PartitionManager`] drives the DDL side of partitioning: creating the
//! partitions schema, provisioning child tables with their check constraints,
//! indexing and constraining them after creation, registering them with the
//! parent, and retiring them when they fall out of the retention window.
//!
//! These are operator-invoked paths, not steady-state ones: failures are
//! surfaced with the affected key identified, never retried. Batch operations
//! run sequentially over the range: partition creation is schema-locking DDL
//! and is not safely parallelizable.

pub mod ddl;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{build_identity, TableIdentity};
use crate::config::PartitionSpec;
use crate::core::namer;
use crate::core::strategy::{NormalizedKey, PartitionRange};
use crate::core::value::SqlValue;
use crate::engine::{DdlExecutor, SchemaInspector};
use crate::error::{PartitionError, Result};

/// Caller policy for batch provisioning.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProvisionOptions {
    /// Treat `AlreadyExists` as a skip instead of a failure.
    pub skip_existing: bool,

    /// Keep provisioning subsequent keys after a failure. The default is
    /// fail fast: stop at the first failure and report which key failed.
    pub continue_on_error: bool,
}

impl ProvisionOptions {
    /// Idempotent re-run policy: skip existing partitions, keep going.
    pub fn idempotent() -> Self {
        Self {
            skip_existing: true,
            continue_on_error: true,
        }
    }
}

/// One failed key in a batch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionFailure {
    /// Local name of the partition the key resolved to.
    pub partition: String,

    /// Rendered error.
    pub error: String,
}

/// Per-identifier outcome of a batch provisioning run, so retries can be
/// key-scoped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionReport {
    /// Partitions created, in range order.
    pub created: Vec<String>,

    /// Partitions skipped because they already existed.
    pub skipped: Vec<String>,

    /// Partitions that failed, with the rendered error.
    pub failed: Vec<ProvisionFailure>,
}

impl ProvisionReport {
    /// Total number of keys the run touched.
    pub fn total(&self) -> usize {
        self.created.len() + self.skipped.len() + self.failed.len()
    }

    /// Names of the failed partitions.
    pub fn failed_names(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.partition.clone()).collect()
    }

    fn into_result(self) -> Result<ProvisionReport> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(PartitionError::Provision { report: self })
        }
    }
}

/// Per-identifier outcome of a retention sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    /// Partitions archived or dropped, in sweep order.
    pub processed: Vec<String>,

    /// Partitions that failed, with the rendered error.
    pub failed: Vec<ProvisionFailure>,
}

/// Orchestrates partition DDL through the external executor.
pub struct PartitionManager {
    spec: Arc<PartitionSpec>,
    ddl: Arc<dyn DdlExecutor>,
    inspector: Arc<dyn SchemaInspector>,
}

impl PartitionManager {
    pub fn new(
        spec: Arc<PartitionSpec>,
        ddl: Arc<dyn DdlExecutor>,
        inspector: Arc<dyn SchemaInspector>,
    ) -> Self {
        Self {
            spec,
            ddl,
            inspector,
        }
    }

    /// The spec this manager administers.
    pub fn spec(&self) -> &PartitionSpec {
        &self.spec
    }

    fn normalize(&self, key_value: &SqlValue) -> Result<NormalizedKey> {
        self.spec
            .strategy
            .normalize(self.spec.key_field(), key_value)
    }

    /// Create the partitions schema if absent.
    pub async fn create_schema(&self) -> Result<()> {
        let sql = ddl::create_schema_sql(&self.spec)?;
        info!(schema = %namer::schema_name(&self.spec), "creating partitions schema");
        self.ddl.execute(&sql).await
    }

    /// Drop the partitions schema and every child table in it.
    pub async fn drop_schema(&self) -> Result<()> {
        let sql = ddl::drop_schema_sql(&self.spec)?;
        warn!(schema = %namer::schema_name(&self.spec), "dropping partitions schema");
        self.ddl.execute(&sql).await
    }

    /// Create the child table for a raw key value.
    ///
    /// Fails with `AlreadyExists` when the table is present; idempotent
    /// creation is a caller policy (see [`ProvisionOptions::skip_existing`]).
    pub async fn create_partition_table(&self, key_value: &SqlValue) -> Result<TableIdentity> {
        let key = self.normalize(key_value)?;
        let identity = build_identity(&self.spec, &key);

        if self
            .inspector
            .table_exists(&identity.schema, &identity.table)
            .await?
        {
            return Err(PartitionError::AlreadyExists {
                table: identity.qualified_name(),
            });
        }

        let sql = ddl::create_table_sql(&self.spec, &key)?;
        info!(table = %identity, "creating partition table");
        self.ddl.execute(&sql).await?;
        Ok(identity)
    }

    /// Add the spec's secondary indexes to an existing child table.
    ///
    /// Runs after table creation: child tables are created fast and indexed
    /// afterward to keep bulk provisioning cheap.
    pub async fn add_partition_indexes(&self, key_value: &SqlValue) -> Result<()> {
        let key = self.normalize(key_value)?;
        for index in &self.spec.indexes {
            let sql = ddl::create_index_sql(&self.spec, &key, index)?;
            debug!(index = %ddl::index_name(&self.spec, &key, index), "creating partition index");
            self.ddl.execute(&sql).await?;
        }
        Ok(())
    }

    /// Add the spec's foreign keys to an existing child table.
    pub async fn add_partition_foreign_keys(&self, key_value: &SqlValue) -> Result<()> {
        let key = self.normalize(key_value)?;
        for fk in &self.spec.foreign_keys {
            let sql = ddl::add_foreign_key_sql(&self.spec, &key, fk)?;
            self.ddl.execute(&sql).await?;
        }
        Ok(())
    }

    /// Register the child table as a recognized child of the parent.
    pub async fn add_parent_routing_rule(&self, key_value: &SqlValue) -> Result<()> {
        let key = self.normalize(key_value)?;
        let sql = ddl::parent_routing_rule_sql(&self.spec, &key)?;
        self.ddl.execute(&sql).await
    }

    /// Fully provision one partition: table, indexes, foreign keys, parent
    /// routing rule.
    pub async fn create_new_partition(&self, key_value: &SqlValue) -> Result<TableIdentity> {
        let identity = self.create_partition_table(key_value).await?;
        self.add_partition_indexes(key_value).await?;
        self.add_partition_foreign_keys(key_value).await?;
        self.add_parent_routing_rule(key_value).await?;
        Ok(identity)
    }

    /// Provision a range of partitions, creating the schema first if absent.
    ///
    /// Iterates in range order, one key at a time. A schema-creation failure
    /// aborts the whole batch. With default options the first per-key failure
    /// stops the run; the returned error carries the report identifying the
    /// failing key. `None` uses the strategy's default range.
    pub async fn create_new_partitions(
        &self,
        range: Option<PartitionRange>,
        options: ProvisionOptions,
    ) -> Result<ProvisionReport> {
        let range = match range {
            Some(range) => range,
            None => self.spec.strategy.default_range()?,
        };
        range.validate()?;

        self.create_schema().await?;

        let mut report = ProvisionReport::default();
        for key_value in range.iter() {
            let part = match self.normalize(&key_value) {
                Ok(key) => namer::part_name(&self.spec, &key),
                Err(e) => {
                    report.failed.push(ProvisionFailure {
                        partition: key_value.to_string(),
                        error: e.to_string(),
                    });
                    if options.continue_on_error {
                        continue;
                    }
                    break;
                }
            };

            match self.create_new_partition(&key_value).await {
                Ok(_) => report.created.push(part),
                Err(PartitionError::AlreadyExists { .. }) if options.skip_existing => {
                    debug!(partition = %part, "partition already exists, skipping");
                    report.skipped.push(part);
                }
                Err(e) => {
                    warn!(partition = %part, error = %e, "partition provisioning failed");
                    report.failed.push(ProvisionFailure {
                        partition: part,
                        error: e.to_string(),
                    });
                    if !options.continue_on_error {
                        break;
                    }
                }
            }
        }

        info!(
            created = report.created.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "partition provisioning finished"
        );
        report.into_result()
    }

    /// Create the full partition infrastructure: schema plus the strategy's
    /// default range of partitions.
    pub async fn create_infrastructure(&self) -> Result<ProvisionReport> {
        self.create_new_partitions(None, ProvisionOptions::default())
            .await
    }

    /// Drop the child table for a raw key value.
    pub async fn drop_partition_table(&self, key_value: &SqlValue) -> Result<()> {
        let key = self.normalize(key_value)?;
        let sql = ddl::drop_table_sql(&self.spec, &key)?;
        info!(table = %namer::table_name(&self.spec, &key), "dropping partition table");
        self.ddl.execute(&sql).await
    }

    /// Rename the child table under the archive naming convention,
    /// preserving its data.
    pub async fn archive_partition(&self, key_value: &SqlValue) -> Result<()> {
        let key = self.normalize(key_value)?;
        let sql = ddl::archive_table_sql(&self.spec, &key)?;
        info!(table = %namer::table_name(&self.spec, &key), "archiving partition table");
        self.ddl.execute(&sql).await
    }

    /// Whether the child table for a raw key value exists.
    pub async fn partition_exists(&self, key_value: &SqlValue) -> Result<bool> {
        let key = self.normalize(key_value)?;
        self.inspector
            .table_exists(&namer::schema_name(&self.spec), &namer::part_name(&self.spec, &key))
            .await
    }

    /// Local names of the live child tables, newest base name first (the
    /// order administrative listings use). Integer base names compare
    /// numerically, so `p10` lists after `p2`.
    pub async fn list_partitions(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .inspector
            .partition_tables(&namer::schema_name(&self.spec))
            .await?
            .into_iter()
            .filter(|name| {
                name.starts_with(&self.spec.name_prefix)
                    && !name.starts_with(namer::ARCHIVE_PREFIX)
            })
            .collect();
        let prefix = self.spec.name_prefix.as_str();
        names.sort_by(|a, b| {
            let parse = |name: &str| name.strip_prefix(prefix).and_then(|s| s.parse::<i64>().ok());
            match (parse(a), parse(b)) {
                (Some(a), Some(b)) => b.cmp(&a),
                _ => b.cmp(a),
            }
        });
        Ok(names)
    }

    /// Archive every partition whose bucket fell out of the retention window.
    pub async fn archive_old_partitions(&self) -> Result<SweepReport> {
        self.sweep_old_partitions(true).await
    }

    /// Drop every partition whose bucket fell out of the retention window.
    pub async fn drop_old_partitions(&self) -> Result<SweepReport> {
        self.sweep_old_partitions(false).await
    }

    async fn sweep_old_partitions(&self, archive: bool) -> Result<SweepReport> {
        let granularity = self.spec.time_granularity().ok_or_else(|| {
            PartitionError::Config(
                "retention sweeps apply to time-based specs only".to_string(),
            )
        })?;
        let retention = self.spec.retention.ok_or_else(|| {
            PartitionError::Config(format!(
                "no retention policy configured for {}",
                self.spec.logical_name()
            ))
        })?;

        let current = granularity.bucket_start(Utc::now().date_naive());
        let cutoff = granularity.offset(current, -(retention.keep_periods as i64));

        let mut report = SweepReport::default();
        for part in self.list_partitions().await? {
            let Some(bucket) = self.parse_bucket(&part) else {
                continue;
            };
            if bucket >= cutoff {
                continue;
            }

            let key = NormalizedKey::Date(bucket);
            let result = if archive {
                ddl::archive_table_sql(&self.spec, &key)
            } else {
                ddl::drop_table_sql(&self.spec, &key)
            };
            let outcome = match result {
                Ok(sql) => self.ddl.execute(&sql).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    info!(
                        partition = %part,
                        action = if archive { "archive" } else { "drop" },
                        "retired partition outside retention window"
                    );
                    report.processed.push(part);
                }
                Err(e) => {
                    warn!(partition = %part, error = %e, "retention sweep failed for partition");
                    report.failed.push(ProvisionFailure {
                        partition: part,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Parse a child table's base name back to its bucket start.
    fn parse_bucket(&self, part: &str) -> Option<NaiveDate> {
        let base = part.strip_prefix(&self.spec.name_prefix)?;
        NaiveDate::parse_from_str(base, "%Y%m%d").ok()
    }
}
