//! Pure naming layer for partition tables.
//!
//! Computes schema, table, and alias names from a spec and a normalized key.
//! No I/O and fully deterministic. The exact construction rules, separators
//! included, are a compatibility surface: administrative tooling and humans
//! inspect physical table names directly, so they must reproduce the names of
//! already-provisioned partitions.

use crate::config::PartitionSpec;
use crate::core::strategy::NormalizedKey;

/// Prefix applied when a partition is archived rather than dropped.
pub const ARCHIVE_PREFIX: &str = "archived_";

/// Schema holding all child tables of the parent.
///
/// `<parent_table>_partitions`, prefixed by the parent's schema qualifier and
/// an underscore when the parent lives outside the default schema:
/// `employees` -> `employees_partitions`, `other.employees` ->
/// `other_employees_partitions`.
pub fn schema_name(spec: &PartitionSpec) -> String {
    let mut parts = Vec::with_capacity(3);
    if spec.parent_schema != "public" {
        parts.push(spec.parent_schema.as_str());
    }
    parts.push(spec.parent_table.as_str());
    parts.push("partitions");
    parts.join("_")
}

/// The child table's name without schema or prefix (`42`, `a`, `20140217`).
pub fn base_name(key: &NormalizedKey) -> String {
    key.to_string()
}

/// The child table's local name: `<prefix><base_name>`.
pub fn part_name(spec: &PartitionSpec, key: &NormalizedKey) -> String {
    format!("{}{}", spec.name_prefix, base_name(key))
}

/// The child table's full name: `<schema>.<prefix><base_name>`.
pub fn table_name(spec: &PartitionSpec, key: &NormalizedKey) -> String {
    format!("{}.{}", schema_name(spec), part_name(spec, key))
}

/// Alias for partitioned queries: the parent's name with schema separators
/// replaced by underscores, so results reflect the logical column names
/// unqualified.
pub fn alias_name(spec: &PartitionSpec) -> String {
    spec.logical_name().replace('.', "_")
}

/// Local name of an archived child table.
pub fn archive_name(spec: &PartitionSpec, key: &NormalizedKey) -> String {
    format!("{}{}", ARCHIVE_PREFIX, part_name(spec, key))
}
