//! Core value, naming, and strategy types.

pub mod identifier;
pub mod namer;
pub mod strategy;
pub mod value;

pub use strategy::{NormalizedKey, PartitionKeyStrategy, PartitionRange, TimeGranularity};
pub use value::SqlValue;
