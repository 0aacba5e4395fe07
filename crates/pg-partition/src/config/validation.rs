//! Partition spec validation.

use super::PartitionSpec;
use crate::core::identifier::validate_identifier;
use crate::core::strategy::PartitionKeyStrategy;
use crate::error::{PartitionError, Result};

/// Validate a partition spec.
pub fn validate(spec: &PartitionSpec) -> Result<()> {
    validate_identifier(&spec.parent_schema)?;
    validate_identifier(&spec.parent_table)?;
    validate_identifier(&spec.primary_key)?;

    if spec.name_prefix.is_empty() {
        return Err(PartitionError::Config(
            "name_prefix is required (numeric base names are not valid identifiers)".into(),
        ));
    }

    match spec.key_fields.len() {
        0 => {
            return Err(PartitionError::Config(
                "at least one partition key field is required".into(),
            ))
        }
        1 => {}
        n => {
            return Err(PartitionError::Config(format!(
                "composite partition keys are not supported (got {} key fields)",
                n
            )))
        }
    }
    for field in &spec.key_fields {
        validate_identifier(field)?;
    }

    match &spec.strategy {
        PartitionKeyStrategy::Modulo { modulus }
        | PartitionKeyStrategy::HashedModulo { modulus } => {
            if *modulus == 0 {
                return Err(PartitionError::Config("modulus must be at least 1".into()));
            }
        }
        PartitionKeyStrategy::Text { buckets } => {
            if buckets.is_empty() {
                return Err(PartitionError::Config(
                    "text strategy requires at least one bucket".into(),
                ));
            }
            for bucket in buckets {
                let normalized = bucket.replace(' ', "_").to_lowercase();
                if *bucket != normalized {
                    return Err(PartitionError::Config(format!(
                        "text bucket {:?} is not in normalized form (expected {:?})",
                        bucket, normalized
                    )));
                }
            }
            let mut seen = std::collections::HashSet::new();
            for bucket in buckets {
                if !seen.insert(bucket) {
                    return Err(PartitionError::Config(format!(
                        "duplicate text bucket {:?}",
                        bucket
                    )));
                }
            }
        }
        PartitionKeyStrategy::Time { .. } => {}
    }

    if spec.retention.is_some() && spec.time_granularity().is_none() {
        return Err(PartitionError::Config(
            "retention windows apply to time-based specs only".into(),
        ));
    }
    if let Some(retention) = spec.retention {
        if retention.keep_periods == 0 {
            return Err(PartitionError::Config(
                "retention.keep_periods must be at least 1".into(),
            ));
        }
    }

    for index in &spec.indexes {
        if index.fields.is_empty() {
            return Err(PartitionError::Config("index has no fields".into()));
        }
        for field in &index.fields {
            validate_identifier(field)?;
        }
    }

    for fk in &spec.foreign_keys {
        validate_identifier(&fk.field)?;
        validate_identifier(&fk.references_table)?;
        validate_identifier(&fk.references_schema)?;
        validate_identifier(&fk.references_field)?;
    }

    if let Some(template) = &spec.check_constraint {
        if !template.contains("{value}") {
            return Err(PartitionError::Config(
                "check_constraint template must contain a {value} placeholder".into(),
            ));
        }
    }

    Ok(())
}
