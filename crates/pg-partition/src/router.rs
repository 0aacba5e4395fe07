//! Statement routing: rewriting CRUD operations onto physical partitions.
//!
//! A [`StatementRouter`] is bound to one logical table's spec. It implements
//! the [`StatementHooks`] interception interface the engine calls before
//! constructing a statement, and offers high-level `insert`/`update`/
//! `delete`/`select_rows` entry points that resolve the target partition and
//! hand the rewritten operation to the [`DmlExecutor`].
//!
//! Routing never masks engine failures: an insert outside the provisioned key
//! range surfaces the engine's "no such table" error verbatim; that is
//! out-of-range input, not a router bug.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::catalog::{PartitionCatalog, TableIdentity};
use crate::config::PartitionSpec;
use crate::core::value::SqlValue;
use crate::engine::{
    AttributeMap, DmlExecutor, Predicate, Row, SchemaInspector, SequenceProvider, StatementHooks,
};
use crate::error::{PartitionError, Result};

/// Routes one logical table's statements to its partitions.
pub struct StatementRouter {
    spec: Arc<PartitionSpec>,
    catalog: Arc<PartitionCatalog>,
    dml: Arc<dyn DmlExecutor>,
    sequences: Arc<dyn SequenceProvider>,
    inspector: Arc<dyn SchemaInspector>,
}

impl StatementRouter {
    pub fn new(
        spec: Arc<PartitionSpec>,
        catalog: Arc<PartitionCatalog>,
        dml: Arc<dyn DmlExecutor>,
        sequences: Arc<dyn SequenceProvider>,
        inspector: Arc<dyn SchemaInspector>,
    ) -> Self {
        Self {
            spec,
            catalog,
            dml,
            sequences,
            inspector,
        }
    }

    /// The spec this router serves.
    pub fn spec(&self) -> &PartitionSpec {
        &self.spec
    }

    /// Pull the partition-key attribute values out of an attribute map.
    ///
    /// Every key field must be present; a missing attribute is a routing
    /// error (the row's physical location cannot be determined).
    fn extract_key_values(&self, values: &AttributeMap) -> Result<Vec<SqlValue>> {
        self.spec
            .key_fields
            .iter()
            .map(|field| {
                values.get(field).cloned().ok_or_else(|| {
                    PartitionError::routing(
                        self.spec.logical_name(),
                        format!("partition key attribute {} missing", field),
                    )
                })
            })
            .collect()
    }

    fn resolve(&self, values: &AttributeMap) -> Result<Arc<TableIdentity>> {
        let key_values = self.extract_key_values(values)?;
        self.catalog.resolve(&self.spec, &key_values)
    }

    /// Insert a row, routing it to the partition its key values select.
    ///
    /// Returns the primary key: the engine-assigned one, or the prefetched or
    /// caller-supplied value when the engine did not produce one.
    pub async fn insert(&self, mut values: AttributeMap) -> Result<Option<i64>> {
        let identity = self.before_insert(&mut values).await?;

        let pk = self.spec.primary_key.as_str();
        let columns: Vec<(String, SqlValue)> = values
            .iter()
            // Null non-key attributes are elided so engine column defaults
            // apply. Partition-key attributes are always emitted: the values
            // that determine physical placement must never be dropped, even
            // when they equal a column default.
            .filter(|(name, value)| !value.is_null() || self.spec.key_fields.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        debug!(table = %identity, "routing insert");
        let engine_pk = self.dml.insert(&identity, &columns).await?;
        Ok(engine_pk.or_else(|| match values.get(pk) {
            Some(SqlValue::Int(id)) => Some(*id),
            _ => None,
        }))
    }

    /// Update an existing row's attributes.
    ///
    /// `stored` is the persisted row snapshot; routing uses its key values,
    /// so unsaved in-memory changes to key fields cannot move the row. The
    /// update targets the row by primary key within the resolved partition.
    pub async fn update(&self, stored: &Row, changes: &AttributeMap) -> Result<u64> {
        if changes.is_empty() {
            return Ok(0);
        }
        let identity = self.before_update(stored).await?;
        let predicate = self.primary_key_predicate(stored)?;
        let assignments: Vec<(String, SqlValue)> = changes
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        debug!(table = %identity, "routing update");
        self.dml.update(&identity, &predicate, &assignments).await
    }

    /// Delete an existing row, located by its stored key values.
    pub async fn delete(&self, stored: &Row) -> Result<u64> {
        let identity = self.before_delete(stored).await?;
        let predicate = self.primary_key_predicate(stored)?;

        debug!(table = %identity, "routing delete");
        self.dml.delete(&identity, &predicate).await
    }

    /// Select rows from the partition the given key values resolve to
    /// (the `from_partition` access path).
    pub async fn select_rows(
        &self,
        key_values: &AttributeMap,
        predicate: &Predicate,
        projection: &[String],
    ) -> Result<Vec<Row>> {
        let identity = self.before_select(key_values).await?;
        debug!(table = %identity, "routing select");
        self.dml.select(&identity, predicate, projection).await
    }

    fn primary_key_predicate(&self, stored: &Row) -> Result<Predicate> {
        let pk = self.spec.primary_key.as_str();
        let value = stored.get(pk).cloned().ok_or_else(|| {
            PartitionError::routing(
                self.spec.logical_name(),
                format!("stored row has no primary key attribute {}", pk),
            )
        })?;
        Ok(Predicate::eq(pk, value))
    }
}

#[async_trait]
impl StatementHooks for StatementRouter {
    async fn before_insert(&self, values: &mut AttributeMap) -> Result<Arc<TableIdentity>> {
        // Resolve before prefetching: placement depends only on key values.
        let identity = self.resolve(values)?;

        let pk = self.spec.primary_key.clone();
        let pk_missing = values.get(&pk).map(SqlValue::is_null).unwrap_or(true);
        if pk_missing
            && self
                .inspector
                .prefetch_required(&identity.qualified_name())
                .await?
        {
            let sequence = self.spec.sequence();
            let next = self.sequences.next_value(&sequence).await?;
            debug!(table = %identity, sequence = %sequence, id = next, "prefetched primary key");
            values.insert(pk, SqlValue::Int(next));
        }

        Ok(identity)
    }

    async fn before_update(&self, stored: &Row) -> Result<Arc<TableIdentity>> {
        self.resolve(stored)
    }

    async fn before_delete(&self, stored: &Row) -> Result<Arc<TableIdentity>> {
        self.resolve(stored)
    }

    async fn before_select(&self, key_values: &AttributeMap) -> Result<Arc<TableIdentity>> {
        self.resolve(key_values)
    }
}

