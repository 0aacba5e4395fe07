//! Thread-safe cache of resolved partition table identities.
//!
//! Every routing decision needs the physical address of the target partition.
//! The address is a pure function of the spec and the normalized key, but it
//! is computed on every insert/update/delete, so resolved identities are
//! cached here, keyed by `(logical table, normalized key)`, and evicted only
//! by explicit invalidation (partition dropped, parent renamed).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::config::PartitionSpec;
use crate::core::namer;
use crate::core::strategy::NormalizedKey;
use crate::core::value::SqlValue;
use crate::error::{PartitionError, Result};

/// Resolved physical address of a partition.
///
/// Immutable once constructed; shared via `Arc` so concurrent operations can
/// hold it for the duration of one statement without cloning.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentity {
    /// Schema holding the partition.
    pub schema: String,

    /// Local table name (`p1`, `pa`, `p20140217`).
    pub table: String,

    /// Alias reflecting the logical table's name back into results.
    pub alias: String,

    /// The normalized key this identity was derived from, rendered as the
    /// base name. Kept for error messages so operators can locate the table.
    pub key: String,
}

impl TableIdentity {
    /// Unquoted `schema.table` form.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl std::fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Build the identity for a spec and normalized key. Pure; used by the
/// catalog on cache miss and by the manager for one-shot addressing.
pub fn build_identity(spec: &PartitionSpec, key: &NormalizedKey) -> TableIdentity {
    TableIdentity {
        schema: namer::schema_name(spec),
        table: namer::part_name(spec, key),
        alias: namer::alias_name(spec),
        key: key.to_string(),
    }
}

/// Thread-safe map from `(logical table, normalized key)` to identity.
///
/// Safe under concurrent resolution from multiple in-flight operations on the
/// same logical table: a coarse lock guards the map, and identities are
/// immutable, so racing misses for the same key insert equal values and both
/// callers observe an identity denoting the same physical table.
#[derive(Debug, Default)]
pub struct PartitionCatalog {
    identities: RwLock<HashMap<(String, NormalizedKey), Arc<TableIdentity>>>,
}

impl PartitionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the table identity for a set of raw key values.
    ///
    /// Normalizes via the spec's strategy, then returns the cached identity,
    /// building and inserting it on miss.
    pub fn resolve(&self, spec: &PartitionSpec, key_values: &[SqlValue]) -> Result<Arc<TableIdentity>> {
        let key = self.normalize(spec, key_values)?;
        self.resolve_normalized(spec, &key)
    }

    /// Resolve from an already-normalized key.
    pub fn resolve_normalized(
        &self,
        spec: &PartitionSpec,
        key: &NormalizedKey,
    ) -> Result<Arc<TableIdentity>> {
        let cache_key = (spec.logical_name(), key.clone());

        if let Some(identity) = self
            .identities
            .read()
            .expect("identity cache lock poisoned")
            .get(&cache_key)
        {
            return Ok(Arc::clone(identity));
        }

        let mut cache = self.identities.write().expect("identity cache lock poisoned");
        // another writer may have won the race; entry() keeps the first value
        let identity = cache
            .entry(cache_key)
            .or_insert_with(|| {
                let identity = build_identity(spec, key);
                debug!(table = %identity, key = %key, "resolved partition identity");
                Arc::new(identity)
            });
        Ok(Arc::clone(identity))
    }

    /// Normalize raw key values under the spec's strategy.
    ///
    /// Fails with `Routing` when no key value was supplied, or with
    /// `InvalidKeyValue` when the value cannot be normalized.
    pub fn normalize(&self, spec: &PartitionSpec, key_values: &[SqlValue]) -> Result<NormalizedKey> {
        let field = spec.key_field();
        let value = key_values.first().ok_or_else(|| {
            PartitionError::routing(
                spec.logical_name(),
                format!("no value supplied for partition key field {}", field),
            )
        })?;
        if value.is_null() {
            return Err(PartitionError::routing(
                spec.logical_name(),
                format!("partition key field {} is null", field),
            ));
        }
        spec.strategy.normalize(field, value)
    }

    /// Drop the cached identity for one key tuple.
    pub fn invalidate(&self, spec: &PartitionSpec, key_values: &[SqlValue]) -> Result<()> {
        let key = self.normalize(spec, key_values)?;
        self.identities
            .write()
            .expect("identity cache lock poisoned")
            .remove(&(spec.logical_name(), key));
        Ok(())
    }

    /// Drop every cached identity for a spec. Used when the parent table's
    /// own configuration changes (e.g. renamed).
    pub fn invalidate_spec(&self, spec: &PartitionSpec) {
        let logical = spec.logical_name();
        self.identities
            .write()
            .expect("identity cache lock poisoned")
            .retain(|(table, _), _| *table != logical);
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.identities
            .write()
            .expect("identity cache lock poisoned")
            .clear();
    }

    /// Number of cached identities (all specs).
    pub fn len(&self) -> usize {
        self.identities
            .read()
            .expect("identity cache lock poisoned")
            .len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
