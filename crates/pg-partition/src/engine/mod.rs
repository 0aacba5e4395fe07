//! Collaborator contracts for the external relational engine.
//!
//! The partitioning core never talks to a database directly. DDL and DML
//! execution, sequence allocation, and schema inspection are delegated to
//! these traits; the engine owns its own connection and transaction
//! semantics. Implementations wrap whatever driver the application uses.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::TableIdentity;
use crate::core::identifier::quote_ident;
use crate::core::value::SqlValue;
use crate::error::Result;

/// Attribute name to value map supplied by an entity-level operation.
pub type AttributeMap = BTreeMap<String, SqlValue>;

/// A result row keyed by column name.
pub type Row = BTreeMap<String, SqlValue>;

/// Conjunction of column equality conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub conditions: Vec<(String, SqlValue)>,
}

impl Predicate {
    /// Predicate matching every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Single equality condition.
    pub fn eq(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            conditions: vec![(column.into(), value.into())],
        }
    }

    /// Add a further equality condition.
    pub fn and(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    /// Render as a SQL fragment (no leading `WHERE`); `TRUE` when empty.
    pub fn to_sql(&self) -> Result<String> {
        if self.conditions.is_empty() {
            return Ok("TRUE".to_string());
        }
        let parts = self
            .conditions
            .iter()
            .map(|(column, value)| {
                Ok(format!("{} = {}", quote_ident(column)?, value.to_sql_literal()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(" AND "))
    }
}

/// Column metadata reported by the schema inspector.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Engine-reported data type.
    pub data_type: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Default expression, if any.
    pub default: Option<String>,
}

/// Executes DDL statements (schema/table/index/constraint creation, archiving,
/// dropping). Failures are surfaced, never retried.
#[async_trait]
pub trait DdlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<()>;
}

/// Executes DML against a resolved physical table.
#[async_trait]
pub trait DmlExecutor: Send + Sync {
    /// Insert a row; returns the engine-assigned primary key when the engine
    /// produced one (it will not when the key was prefetched).
    async fn insert(
        &self,
        table: &TableIdentity,
        columns: &[(String, SqlValue)],
    ) -> Result<Option<i64>>;

    /// Update matching rows; returns the affected row count.
    async fn update(
        &self,
        table: &TableIdentity,
        predicate: &Predicate,
        assignments: &[(String, SqlValue)],
    ) -> Result<u64>;

    /// Delete matching rows; returns the affected row count.
    async fn delete(&self, table: &TableIdentity, predicate: &Predicate) -> Result<u64>;

    /// Select matching rows. An empty projection selects every column.
    async fn select(
        &self,
        table: &TableIdentity,
        predicate: &Predicate,
        projection: &[String],
    ) -> Result<Vec<Row>>;
}

/// Allocates primary key values ahead of insert construction.
///
/// Consulted only when a table's prefetch policy demands it.
#[async_trait]
pub trait SequenceProvider: Send + Sync {
    async fn next_value(&self, sequence: &str) -> Result<i64>;
}

/// Reports schema metadata the core needs for routing and administration.
#[async_trait]
pub trait SchemaInspector: Send + Sync {
    /// Whether inserts into this table must prefetch the primary key
    /// (i.e. it is not a simple auto-increment target).
    async fn prefetch_required(&self, table: &str) -> Result<bool>;

    /// Column descriptors of a table.
    async fn columns_of(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Whether a table exists.
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool>;

    /// Local names of all tables in a schema.
    async fn partition_tables(&self, schema: &str) -> Result<Vec<String>>;
}

/// Interception points the engine's statement builder calls before
/// constructing insert/update/delete/select statements.
///
/// [`StatementRouter`](crate::router::StatementRouter) is the partitioning
/// implementation: each hook resolves the physical target table from the
/// operation's attribute values and hands back the identity to build the
/// statement against.
#[async_trait]
pub trait StatementHooks: Send + Sync {
    /// Resolve the target table for a pending insert and apply the
    /// primary-key prefetch policy. May add the prefetched key to `values`.
    async fn before_insert(&self, values: &mut AttributeMap) -> Result<Arc<TableIdentity>>;

    /// Resolve the target table for an update of an existing row.
    ///
    /// `stored` is the persisted row snapshot; unsaved changes to key fields
    /// must not influence the resolution.
    async fn before_update(&self, stored: &Row) -> Result<Arc<TableIdentity>>;

    /// Resolve the target table for a delete of an existing row.
    async fn before_delete(&self, stored: &Row) -> Result<Arc<TableIdentity>>;

    /// Resolve the target table for a select scoped to specific key values.
    async fn before_select(&self, key_values: &AttributeMap) -> Result<Arc<TableIdentity>>;
}
