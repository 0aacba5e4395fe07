//! Partition spec type definitions.
//!
//! A [`PartitionSpec`] is the immutable per-logical-table configuration:
//! which fields the table partitions on, the key strategy and its parameters,
//! naming inputs, and the index/foreign-key/retention declarations applied to
//! every child table. It is created once at model registration (from YAML or
//! through [`PartitionSpecBuilder`]) and shared read-only by all operations.

use serde::{Deserialize, Serialize};

use crate::core::strategy::{PartitionKeyStrategy, TimeGranularity};
use crate::error::Result;

/// Immutable partitioning configuration for one logical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSpec {
    /// Schema of the parent (logical) table.
    #[serde(default = "default_schema")]
    pub parent_schema: String,

    /// Name of the parent (logical) table.
    pub parent_table: String,

    /// Ordered partition key field names.
    ///
    /// The shipped strategies consume exactly one key value; the list shape
    /// is kept so multi-level strategies can be added without changing the
    /// spec format.
    pub key_fields: Vec<String>,

    /// The partition key strategy and its parameters.
    pub strategy: PartitionKeyStrategy,

    /// Prefix for child table names, so purely numeric base names remain
    /// valid identifiers (`p42`, not `42`).
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Primary key column of the parent table.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Sequence consulted when primary-key prefetch is required.
    ///
    /// Defaults to `<parent_table>_<primary_key>_seq`.
    #[serde(default)]
    pub sequence_name: Option<String>,

    /// Secondary indexes created on every child table.
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,

    /// Foreign keys created on every child table.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeySpec>,

    /// Override for the per-partition check predicate.
    ///
    /// Placeholders: `{field}` (the key field name) and `{value}` (the
    /// normalized key). When absent the strategy's default template applies.
    #[serde(default)]
    pub check_constraint: Option<String>,

    /// Retention window for time-based specs.
    #[serde(default)]
    pub retention: Option<RetentionPolicy>,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_name_prefix() -> String {
    "p".to_string()
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl PartitionSpec {
    /// Start building a spec for the given parent table.
    pub fn builder(parent_table: impl Into<String>) -> PartitionSpecBuilder {
        PartitionSpecBuilder::new(parent_table)
    }

    /// The single partition key field.
    pub fn key_field(&self) -> &str {
        self.key_fields
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// The parent table's qualified name (`schema.table`, bare when public).
    ///
    /// This string keys the identity cache and appears in log and error
    /// output; it intentionally matches how the logical table is referred to
    /// elsewhere.
    pub fn logical_name(&self) -> String {
        if self.parent_schema == "public" {
            self.parent_table.clone()
        } else {
            format!("{}.{}", self.parent_schema, self.parent_table)
        }
    }

    /// Sequence consulted for primary-key prefetching.
    pub fn sequence(&self) -> String {
        self.sequence_name.clone().unwrap_or_else(|| {
            format!("{}_{}_seq", self.parent_table, self.primary_key)
        })
    }

    /// The time granularity when the spec uses the time strategy.
    pub fn time_granularity(&self) -> Option<TimeGranularity> {
        match self.strategy {
            PartitionKeyStrategy::Time { granularity, .. } => Some(granularity),
            _ => None,
        }
    }
}

/// A secondary index created on every child table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Indexed column names.
    pub fields: Vec<String>,

    /// Whether the index is unique.
    #[serde(default)]
    pub unique: bool,
}

impl IndexSpec {
    /// Index on a single field.
    pub fn on(field: impl Into<String>) -> Self {
        Self {
            fields: vec![field.into()],
            unique: false,
        }
    }

    /// Unique index on a single field.
    pub fn unique_on(field: impl Into<String>) -> Self {
        Self {
            fields: vec![field.into()],
            unique: true,
        }
    }
}

/// A foreign key created on every child table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    /// Referencing column on the child table.
    pub field: String,

    /// Referenced table.
    pub references_table: String,

    /// Referenced schema.
    #[serde(default = "default_schema")]
    pub references_schema: String,

    /// Referenced column.
    #[serde(default = "default_primary_key")]
    pub references_field: String,
}

impl ForeignKeySpec {
    /// Foreign key from `field` to `references_table.id` in public.
    pub fn new(field: impl Into<String>, references_table: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            references_table: references_table.into(),
            references_schema: default_schema(),
            references_field: default_primary_key(),
        }
    }
}

/// Retention window for time-based partition sets.
///
/// Partitions whose bucket start is more than `keep_periods` whole periods
/// before the current bucket are eligible for archiving or dropping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub keep_periods: u32,
}

/// Builder producing an immutable [`PartitionSpec`].
///
/// Replaces ad-hoc declarative configuration: every input is an explicit
/// parameter, and `build` validates the result.
#[derive(Debug, Clone)]
pub struct PartitionSpecBuilder {
    spec: PartitionSpec,
}

impl PartitionSpecBuilder {
    fn new(parent_table: impl Into<String>) -> Self {
        Self {
            spec: PartitionSpec {
                parent_schema: default_schema(),
                parent_table: parent_table.into(),
                key_fields: Vec::new(),
                strategy: PartitionKeyStrategy::Modulo {
                    modulus: crate::core::strategy::DEFAULT_MODULUS,
                },
                name_prefix: default_name_prefix(),
                primary_key: default_primary_key(),
                sequence_name: None,
                indexes: Vec::new(),
                foreign_keys: Vec::new(),
                check_constraint: None,
                retention: None,
            },
        }
    }

    /// Set the parent table's schema (default `public`).
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.spec.parent_schema = schema.into();
        self
    }

    /// Declare the partition key field.
    pub fn on(mut self, field: impl Into<String>) -> Self {
        self.spec.key_fields.push(field.into());
        self
    }

    /// Use the modulo strategy.
    pub fn modulo(mut self, modulus: u32) -> Self {
        self.spec.strategy = PartitionKeyStrategy::Modulo { modulus };
        self
    }

    /// Use the hashed-modulo strategy.
    pub fn hashed_modulo(mut self, modulus: u32) -> Self {
        self.spec.strategy = PartitionKeyStrategy::HashedModulo { modulus };
        self
    }

    /// Use the text strategy with the given bucket universe.
    pub fn text_buckets<I, S>(mut self, buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.strategy = PartitionKeyStrategy::Text {
            buckets: buckets.into_iter().map(Into::into).collect(),
        };
        self
    }

    /// Use the time strategy.
    pub fn time(mut self, granularity: TimeGranularity, past_periods: u32, future_periods: u32) -> Self {
        self.spec.strategy = PartitionKeyStrategy::Time {
            granularity,
            past_periods,
            future_periods,
        };
        self
    }

    /// Override the child-name prefix (default `p`).
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.spec.name_prefix = prefix.into();
        self
    }

    /// Name the parent table's primary key column (default `id`).
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.spec.primary_key = column.into();
        self
    }

    /// Override the prefetch sequence name.
    pub fn sequence_name(mut self, sequence: impl Into<String>) -> Self {
        self.spec.sequence_name = Some(sequence.into());
        self
    }

    /// Add a secondary index to every child table.
    pub fn index(mut self, index: IndexSpec) -> Self {
        self.spec.indexes.push(index);
        self
    }

    /// Add a foreign key to every child table.
    pub fn foreign_key(mut self, fk: ForeignKeySpec) -> Self {
        self.spec.foreign_keys.push(fk);
        self
    }

    /// Override the check predicate template (`{field}`/`{value}` placeholders).
    pub fn check_constraint(mut self, template: impl Into<String>) -> Self {
        self.spec.check_constraint = Some(template.into());
        self
    }

    /// Set a retention window (time strategy only).
    pub fn retention(mut self, keep_periods: u32) -> Self {
        self.spec.retention = Some(RetentionPolicy { keep_periods });
        self
    }

    /// Validate and produce the immutable spec.
    pub fn build(mut self) -> Result<PartitionSpec> {
        // every strategy installs an index on its key field unless the spec
        // declares its own indexes
        if self.spec.indexes.is_empty() {
            if let Some(field) = self.spec.key_fields.first() {
                self.spec.indexes.push(IndexSpec::on(field.clone()));
            }
        }
        self.spec.validate()?;
        Ok(self.spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let spec = PartitionSpec::builder("employees")
            .on("integer_field")
            .modulo(2)
            .build()
            .unwrap();
        assert_eq!(spec.parent_schema, "public");
        assert_eq!(spec.name_prefix, "p");
        assert_eq!(spec.primary_key, "id");
        assert_eq!(spec.logical_name(), "employees");
        assert_eq!(spec.sequence(), "employees_id_seq");
        // key-field index installed by default
        assert_eq!(spec.indexes, vec![IndexSpec::on("integer_field")]);
    }

    #[test]
    fn test_builder_explicit_indexes_win() {
        let spec = PartitionSpec::builder("employees")
            .on("integer_field")
            .modulo(2)
            .index(IndexSpec::unique_on("id"))
            .build()
            .unwrap();
        assert_eq!(spec.indexes, vec![IndexSpec::unique_on("id")]);
    }

    #[test]
    fn test_logical_name_qualified_outside_public() {
        let spec = PartitionSpec::builder("employees")
            .schema("other")
            .on("company_id")
            .modulo(96)
            .build()
            .unwrap();
        assert_eq!(spec.logical_name(), "other.employees");
    }

    #[test]
    fn test_sequence_override() {
        let spec = PartitionSpec::builder("employees")
            .on("company_id")
            .modulo(96)
            .sequence_name("employees_custom_seq")
            .build()
            .unwrap();
        assert_eq!(spec.sequence(), "employees_custom_seq");
    }
}
