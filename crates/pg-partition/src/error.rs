//! Error types for the partitioning library.

use thiserror::Error;

use crate::manager::ProvisionReport;

/// Main error type for partition routing and administration.
#[derive(Error, Debug)]
pub enum PartitionError {
    /// Spec configuration error (invalid YAML, bad identifiers, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A raw partition key value could not be normalized.
    ///
    /// Fatal to the single operation; never retried and never coerced.
    #[error("Invalid partition key value for field {field}: {message}")]
    InvalidKeyValue { field: String, message: String },

    /// A required partition key attribute was missing at routing time.
    #[error("Routing failed for {table}: {message}")]
    Routing { table: String, message: String },

    /// The resolved physical table does not exist.
    ///
    /// Surfaced verbatim from the engine; signals an operation outside the
    /// provisioned key range, not a router bug.
    #[error("No partition table {table} exists (key {key})")]
    NoSuchPartition { table: String, key: String },

    /// DDL creation attempted on a partition that already exists.
    ///
    /// The administrative caller decides whether to ignore this.
    #[error("Partition table {table} already exists")]
    AlreadyExists { table: String },

    /// Opaque failure from the DDL/DML executor, passed through unchanged.
    #[error("Engine error: {message}\n  Statement: {statement}")]
    Engine { message: String, statement: String },

    /// A batch provisioning run had per-key failures.
    ///
    /// Carries the full report so retries can be key-scoped.
    #[error("Partition provisioning failed for {} of {} key(s): {}",
            .report.failed.len(),
            .report.total(),
            .report.failed_names().join(", "))]
    Provision { report: ProvisionReport },
}

impl PartitionError {
    /// Create an InvalidKeyValue error.
    pub fn invalid_key(field: impl Into<String>, message: impl Into<String>) -> Self {
        PartitionError::InvalidKeyValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a Routing error.
    pub fn routing(table: impl Into<String>, message: impl Into<String>) -> Self {
        PartitionError::Routing {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an Engine error tied to the statement that produced it.
    pub fn engine(message: impl Into<String>, statement: impl Into<String>) -> Self {
        PartitionError::Engine {
            message: message.into(),
            statement: statement.into(),
        }
    }

    /// True for errors that indicate the target table was absent.
    pub fn is_no_such_partition(&self) -> bool {
        matches!(self, PartitionError::NoSuchPartition { .. })
    }
}

/// Result type alias for partitioning operations.
pub type Result<T> = std::result::Result<T, PartitionError>;
