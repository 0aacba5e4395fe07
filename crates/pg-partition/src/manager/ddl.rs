//! Partition DDL statement builders.
//!
//! Pure string construction, unit-testable without a database. Identifiers
//! are validated and quoted; check predicates deliberately keep the original
//! unquoted field form so the generated constraints match what administrative
//! tooling expects to find on already-provisioned partitions.

use crate::config::{ForeignKeySpec, IndexSpec, PartitionSpec};
use crate::core::identifier::{qualify, quote_ident, quote_literal};
use crate::core::namer;
use crate::core::strategy::{NormalizedKey, PartitionKeyStrategy};
use crate::error::{PartitionError, Result};

/// The per-partition check predicate for a normalized key.
///
/// `qualifier` prefixes the key field (e.g. `NEW` for parent routing rules).
/// A spec-level template overrides the strategy default; placeholders are
/// `{field}` and `{value}`.
pub fn check_predicate(
    spec: &PartitionSpec,
    key: &NormalizedKey,
    qualifier: Option<&str>,
) -> Result<String> {
    let field = match qualifier {
        Some(q) => format!("{}.{}", q, spec.key_field()),
        None => spec.key_field().to_string(),
    };

    if let Some(template) = &spec.check_constraint {
        return Ok(template
            .replace("{field}", &field)
            .replace("{value}", &key.to_string()));
    }

    match (&spec.strategy, key) {
        (
            PartitionKeyStrategy::Modulo { modulus }
            | PartitionKeyStrategy::HashedModulo { modulus },
            NormalizedKey::Int(value),
        ) => Ok(format!(
            "({}::integer % {}) = {}::integer",
            field, modulus, value
        )),
        (PartitionKeyStrategy::Text { .. }, NormalizedKey::Text(value)) => Ok(format!(
            "{}::text = {}::text",
            field,
            quote_literal(&value.to_uppercase())
        )),
        (PartitionKeyStrategy::Time { granularity, .. }, NormalizedKey::Date(start)) => {
            let end = granularity.next(*start);
            Ok(format!(
                "{field} >= '{start}' AND {field} < '{end}'",
                field = field,
                start = start.format("%Y-%m-%d"),
                end = end.format("%Y-%m-%d"),
            ))
        }
        (_, key) => Err(PartitionError::Config(format!(
            "normalized key {} does not match the spec's strategy",
            key
        ))),
    }
}

/// `CREATE SCHEMA IF NOT EXISTS` for the partitions schema.
pub fn create_schema_sql(spec: &PartitionSpec) -> Result<String> {
    Ok(format!(
        "CREATE SCHEMA IF NOT EXISTS {}",
        quote_ident(&namer::schema_name(spec))?
    ))
}

/// Drop the partitions schema and everything in it.
pub fn drop_schema_sql(spec: &PartitionSpec) -> Result<String> {
    Ok(format!(
        "DROP SCHEMA IF EXISTS {} CASCADE",
        quote_ident(&namer::schema_name(spec))?
    ))
}

/// Create a child table inheriting the parent's columns, constrained to its
/// key bucket.
pub fn create_table_sql(spec: &PartitionSpec, key: &NormalizedKey) -> Result<String> {
    let child = qualify(&namer::schema_name(spec), &namer::part_name(spec, key))?;
    let parent = qualify(&spec.parent_schema, &spec.parent_table)?;
    let predicate = check_predicate(spec, key, None)?;
    Ok(format!(
        "CREATE TABLE {child} (\n  CHECK ({predicate})\n) INHERITS ({parent})",
        child = child,
        predicate = predicate,
        parent = parent,
    ))
}

/// Name of a secondary index on a child table.
pub fn index_name(spec: &PartitionSpec, key: &NormalizedKey, index: &IndexSpec) -> String {
    format!(
        "index_{}_on_{}",
        namer::part_name(spec, key),
        index.fields.join("_")
    )
}

/// Create a secondary index on a child table.
pub fn create_index_sql(
    spec: &PartitionSpec,
    key: &NormalizedKey,
    index: &IndexSpec,
) -> Result<String> {
    let child = qualify(&namer::schema_name(spec), &namer::part_name(spec, key))?;
    let columns = index
        .fields
        .iter()
        .map(|f| quote_ident(f))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    Ok(format!(
        "CREATE {unique}INDEX {name} ON {child} ({columns})",
        unique = if index.unique { "UNIQUE " } else { "" },
        name = quote_ident(&index_name(spec, key, index))?,
        child = child,
        columns = columns,
    ))
}

/// Add a foreign key constraint to a child table.
pub fn add_foreign_key_sql(
    spec: &PartitionSpec,
    key: &NormalizedKey,
    fk: &ForeignKeySpec,
) -> Result<String> {
    let part = namer::part_name(spec, key);
    let child = qualify(&namer::schema_name(spec), &part)?;
    let constraint = format!("{}_{}_fkey", part, fk.field);
    Ok(format!(
        "ALTER TABLE {child} ADD CONSTRAINT {constraint} FOREIGN KEY ({column}) REFERENCES {referenced} ({ref_column})",
        child = child,
        constraint = quote_ident(&constraint)?,
        column = quote_ident(&fk.field)?,
        referenced = qualify(&fk.references_schema, &fk.references_table)?,
        ref_column = quote_ident(&fk.references_field)?,
    ))
}

/// Register the child with the parent: a rewrite rule redirecting matching
/// inserts on the parent into the child, so non-partition-aware tools still
/// see a consistent hierarchy.
pub fn parent_routing_rule_sql(spec: &PartitionSpec, key: &NormalizedKey) -> Result<String> {
    let part = namer::part_name(spec, key);
    let child = qualify(&namer::schema_name(spec), &part)?;
    let parent = qualify(&spec.parent_schema, &spec.parent_table)?;
    let predicate = check_predicate(spec, key, Some("NEW"))?;
    Ok(format!(
        "CREATE OR REPLACE RULE {rule} AS ON INSERT TO {parent} WHERE {predicate} DO INSTEAD INSERT INTO {child} VALUES (NEW.*)",
        rule = quote_ident(&format!("{}_insert_redirector", part))?,
        parent = parent,
        predicate = predicate,
        child = child,
    ))
}

/// Drop a child table.
pub fn drop_table_sql(spec: &PartitionSpec, key: &NormalizedKey) -> Result<String> {
    Ok(format!(
        "DROP TABLE {}",
        qualify(&namer::schema_name(spec), &namer::part_name(spec, key))?
    ))
}

/// Rename a child table under the archive naming convention, preserving data.
pub fn archive_table_sql(spec: &PartitionSpec, key: &NormalizedKey) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} RENAME TO {}",
        qualify(&namer::schema_name(spec), &namer::part_name(spec, key))?,
        quote_ident(&namer::archive_name(spec, key))?,
    ))
}
