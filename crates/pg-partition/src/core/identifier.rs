//! Identifier validation and quoting for generated PostgreSQL statements.
//!
//! Identifiers (schema, table, column names) cannot be bound as statement
//! parameters, so every name that reaches a generated statement goes through
//! validation and double-quote escaping here. Partition base names are
//! machine-derived, but parent table and column names come from the spec and
//! are treated as untrusted.

use crate::error::{PartitionError, Result};

/// PostgreSQL truncates identifiers at 63 bytes; names at the limit are a
/// configuration mistake, not something to silently shorten.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier before it is embedded in a statement.
///
/// Rejects empty names, null bytes, and names over the PostgreSQL length
/// limit.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PartitionError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(PartitionError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(PartitionError::Config(format!(
            "Identifier exceeds {} bytes (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a table name with its schema, quoting both parts.
pub fn qualify(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?))
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
