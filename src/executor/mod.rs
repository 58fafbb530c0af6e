//! Aggregation query executor: the record-store boundary
//!
//! The engine never touches the record store directly. It hands an
//! [`AggregationExecutor`] a time range, a bucketing expression and the
//! report's columns and conditions, and gets back one raw value per
//! non-empty bucket. A bucket missing from the result is not an error; it
//! means no records fell into it and is read as zero.

mod memory;

pub use memory::{MemoryRecord, MemoryRecordStore};

use crate::error::ExecutorError;
use crate::types::{AggregationKind, Conditions};
use chrono::{DateTime, Utc};

/// Everything an executor needs to run one aggregation
#[derive(Debug, Clone)]
pub struct AggregationRequest {
    /// How record values are folded per bucket
    pub aggregation: AggregationKind,
    /// Column aggregated over; required for every kind except count
    pub value_column: Option<String>,
    /// Column holding each record's instant
    pub date_column: String,
    /// Equality filters applied before aggregation
    pub conditions: Conditions,
    /// Store-specific bucketing expression from the dialect adapter
    pub bucketing_expression: String,
}

/// One raw per-bucket value as returned by the record store
#[derive(Debug, Clone, PartialEq)]
pub struct BucketValue {
    /// Store-native bucket key; parsed back via the dialect adapter
    pub bucket_key: String,
    /// Aggregated value for the bucket
    pub value: f64,
}

/// Aggregated reads over the record store
pub trait AggregationExecutor: Send + Sync {
    /// Aggregate records with `begin <= date` (and `date <= end` when bounded)
    /// into per-bucket values
    ///
    /// `end = None` means "through the still-open current bucket". Returns
    /// one entry per non-empty bucket touching the range; empty buckets are
    /// omitted.
    fn execute(
        &self,
        begin: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        request: &AggregationRequest,
    ) -> Result<Vec<BucketValue>, ExecutorError>;

    /// Aggregate all records with `date < before` into one scalar
    ///
    /// Unbounded below; used to seed cumulated reports with the history
    /// outside the visible window. No records yields 0.
    fn execute_total(
        &self,
        before: DateTime<Utc>,
        request: &AggregationRequest,
    ) -> Result<f64, ExecutorError>;
}
