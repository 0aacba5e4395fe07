//! Partition spec loading and validation.
//!
//! The YAML front-end is a convenience only; the structured [`PartitionSpec`]
//! is the contract consumed by the rest of the crate.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use crate::error::Result;

impl PartitionSpec {
    /// Load a spec from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::PartitionError::Config(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse a spec from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut spec: PartitionSpec = serde_yaml::from_str(yaml)
            .map_err(|e| crate::error::PartitionError::Config(e.to_string()))?;
        // same default as the builder: an index on the key field unless the
        // document declares its own
        if spec.indexes.is_empty() {
            if let Some(field) = spec.key_fields.first() {
                spec.indexes.push(IndexSpec::on(field.clone()));
            }
        }
        spec.validate()?;
        Ok(spec)
    }

    /// Validate the spec.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}
