//! Partition key strategies (Strategy pattern over a tagged enum).
//!
//! A strategy converts a raw key value into a [`NormalizedKey`], the stable
//! bucket identifier that determines the physical partition, and knows how to
//! enumerate a default range of raw values for batch provisioning.
//!
//! Normalization is a pure, deterministic function of the raw value and the
//! strategy parameters only. Equal normalized keys always denote the same
//! physical table.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::value::SqlValue;
use crate::error::{PartitionError, Result};

/// Default modulus for the modulo-based strategies.
pub const DEFAULT_MODULUS: u32 = 96;

/// The deterministic reduction of a raw key value to a bucket identifier.
///
/// `Display` yields the partition base name (`42`, `wool_pants`, `20140217`);
/// this string is part of the external naming contract and must not change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NormalizedKey {
    /// Modulo bucket.
    Int(i64),
    /// Normalized text bucket.
    Text(String),
    /// Start of a time bucket.
    Date(NaiveDate),
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedKey::Int(v) => write!(f, "{}", v),
            NormalizedKey::Text(v) => write!(f, "{}", v),
            NormalizedKey::Date(v) => write!(f, "{}", v.format("%Y%m%d")),
        }
    }
}

/// Granularity of a time-bucketed partition scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGranularity {
    Day,
    Week,
    Month,
    Year,
}

impl TimeGranularity {
    /// The first day of the bucket containing `date`. Weeks start on Monday.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            TimeGranularity::Day => date,
            TimeGranularity::Week => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            TimeGranularity::Month => date.with_day(1).unwrap_or(date),
            TimeGranularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }

    /// Advance a bucket start by `periods` whole buckets (may be negative).
    pub fn offset(&self, bucket: NaiveDate, periods: i64) -> NaiveDate {
        match self {
            TimeGranularity::Day => bucket + Duration::days(periods),
            TimeGranularity::Week => bucket + Duration::weeks(periods),
            TimeGranularity::Month | TimeGranularity::Year => {
                let months = match self {
                    TimeGranularity::Month => periods,
                    _ => periods * 12,
                };
                if months >= 0 {
                    bucket + Months::new(months as u32)
                } else {
                    bucket - Months::new((-months) as u32)
                }
            }
        }
    }

    /// The start of the bucket after `bucket`.
    pub fn next(&self, bucket: NaiveDate) -> NaiveDate {
        self.offset(bucket, 1)
    }
}

/// Policy that converts raw key input into a [`NormalizedKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionKeyStrategy {
    /// `normalize(v) = v mod modulus`, integers only.
    Modulo {
        #[serde(default = "default_modulus")]
        modulus: u32,
    },

    /// `normalize(v) = last 8 hex chars of MD5(stringify(v)), base-16, mod modulus`.
    ///
    /// Used when raw key values are not uniformly distributed integers
    /// (UUID-like identifiers). The trailing-8-hex derivation is load-bearing:
    /// physical table names must match partitions provisioned by earlier
    /// implementations of the same scheme.
    HashedModulo {
        #[serde(default = "default_modulus")]
        modulus: u32,
    },

    /// `normalize(v) = downcase(replace(stringify(v), ' ', '_'))`.
    ///
    /// The bucket universe is supplied externally; there is no numeric default.
    Text { buckets: Vec<String> },

    /// Buckets a timestamp to the start of its period.
    ///
    /// `past_periods`/`future_periods` define the default creation range
    /// around "now" for batch provisioning and the retention arithmetic.
    Time {
        granularity: TimeGranularity,
        #[serde(default)]
        past_periods: u32,
        #[serde(default = "default_future_periods")]
        future_periods: u32,
    },
}

fn default_modulus() -> u32 {
    DEFAULT_MODULUS
}

fn default_future_periods() -> u32 {
    4
}

impl PartitionKeyStrategy {
    /// Normalize a raw key value.
    ///
    /// Fails with `InvalidKeyValue` when the value has the wrong shape for the
    /// strategy; values are never silently coerced.
    pub fn normalize(&self, field: &str, value: &SqlValue) -> Result<NormalizedKey> {
        match self {
            PartitionKeyStrategy::Modulo { modulus } => match value {
                SqlValue::Int(v) => Ok(NormalizedKey::Int(v.rem_euclid(*modulus as i64))),
                other => Err(PartitionError::invalid_key(
                    field,
                    format!("modulo strategy requires an integer, got {}", other.type_name()),
                )),
            },
            PartitionKeyStrategy::HashedModulo { modulus } => match value {
                SqlValue::Int(_) | SqlValue::Uuid(_) | SqlValue::Text(_) => Ok(NormalizedKey::Int(
                    hashed_bucket(&value.to_string(), *modulus),
                )),
                other => Err(PartitionError::invalid_key(
                    field,
                    format!(
                        "hashed modulo strategy requires an integer, uuid, or text value, got {}",
                        other.type_name()
                    ),
                )),
            },
            PartitionKeyStrategy::Text { .. } => match value {
                SqlValue::Text(_) | SqlValue::Int(_) | SqlValue::Uuid(_) => Ok(NormalizedKey::Text(
                    value.to_string().replace(' ', "_").to_lowercase(),
                )),
                other => Err(PartitionError::invalid_key(
                    field,
                    format!("text strategy cannot normalize a {} value", other.type_name()),
                )),
            },
            PartitionKeyStrategy::Time { granularity, .. } => match value {
                SqlValue::Timestamp(ts) => {
                    Ok(NormalizedKey::Date(granularity.bucket_start(ts.date_naive())))
                }
                other => Err(PartitionError::invalid_key(
                    field,
                    format!("time strategy requires a timestamp, got {}", other.type_name()),
                )),
            },
        }
    }

    /// Enumerate the default range of raw key values for batch provisioning.
    pub fn default_range(&self) -> Result<PartitionRange> {
        self.default_range_at(Utc::now())
    }

    /// Default range relative to an explicit "now" (time strategy only cares).
    pub fn default_range_at(&self, now: DateTime<Utc>) -> Result<PartitionRange> {
        match self {
            PartitionKeyStrategy::Modulo { modulus }
            | PartitionKeyStrategy::HashedModulo { modulus } => Ok(PartitionRange::Ints {
                start: 0,
                end: *modulus as i64 - 1,
                step: 1,
            }),
            PartitionKeyStrategy::Text { buckets } => {
                if buckets.is_empty() {
                    return Err(PartitionError::Config(
                        "text strategy has no default range: no buckets configured".to_string(),
                    ));
                }
                Ok(PartitionRange::Texts(buckets.clone()))
            }
            PartitionKeyStrategy::Time {
                granularity,
                past_periods,
                future_periods,
            } => {
                let today = granularity.bucket_start(now.date_naive());
                Ok(PartitionRange::Times {
                    start: granularity.offset(today, -(*past_periods as i64)),
                    end: granularity.offset(today, *future_periods as i64),
                    granularity: *granularity,
                })
            }
        }
    }
}

/// Decode the trailing 8 hex characters of the MD5 digest as an unsigned
/// integer and reduce it mod `modulus`.
fn hashed_bucket(raw: &str, modulus: u32) -> i64 {
    let digest = format!("{:x}", md5::compute(raw.as_bytes()));
    let tail = &digest[digest.len() - 8..];
    // 8 hex chars always fit in a u32; the digest is lowercase hex by
    // construction so the parse cannot fail.
    let decoded = u64::from_str_radix(tail, 16).unwrap_or(0);
    (decoded % modulus as u64) as i64
}

/// An enumerable sequence of raw key values used to batch-create or
/// batch-retire partitions.
///
/// Every element, once normalized under the owning spec, maps to a distinct
/// normalized key.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionRange {
    /// Inclusive integer range with a step.
    Ints { start: i64, end: i64, step: i64 },
    /// Explicit list of text buckets.
    Texts(Vec<String>),
    /// Bucket starts from `start` through the bucket containing `end`.
    Times {
        start: NaiveDate,
        end: NaiveDate,
        granularity: TimeGranularity,
    },
}

impl PartitionRange {
    /// Reject ranges that cannot be iterated sensibly.
    ///
    /// A non-positive integer step is a caller mistake, not something to
    /// silently correct.
    pub fn validate(&self) -> Result<()> {
        match self {
            PartitionRange::Ints { step, .. } if *step < 1 => Err(PartitionError::Config(
                format!("integer range step must be at least 1 (got {})", step),
            )),
            _ => Ok(()),
        }
    }

    /// Iterate the raw key values in range order.
    ///
    /// Invalid ranges (see [`validate`](Self::validate)) iterate empty so the
    /// iterator stays finite either way.
    pub fn iter(&self) -> Box<dyn Iterator<Item = SqlValue> + '_> {
        match self {
            PartitionRange::Ints { start, end, step } => {
                let (start, end, step) = (*start, *end, *step);
                if step < 1 {
                    return Box::new(std::iter::empty());
                }
                Box::new(
                    std::iter::successors(Some(start), move |v| {
                        let next = v + step;
                        (next <= end).then_some(next)
                    })
                    .map(SqlValue::Int),
                )
            }
            PartitionRange::Texts(buckets) => {
                Box::new(buckets.iter().cloned().map(SqlValue::Text))
            }
            PartitionRange::Times {
                start,
                end,
                granularity,
            } => {
                let (end, granularity) = (*end, *granularity);
                let first = granularity.bucket_start(*start);
                Box::new(
                    std::iter::successors(Some(first), move |d| {
                        let next = granularity.next(*d);
                        (next <= end).then_some(next)
                    })
                    .map(|d| {
                        SqlValue::Timestamp(DateTime::from_naive_utc_and_offset(
                            d.and_hms_opt(0, 0, 0).expect("midnight is always valid"),
                            Utc,
                        ))
                    }),
                )
            }
        }
    }

    /// Number of raw key values in the range.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}
